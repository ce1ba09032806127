//! Pure helpers over ComfyUI history entries.
//!
//! A history entry is a JSON object with an `outputs` map of node id to
//! node result; image-producing nodes carry an `images` array of
//! `{filename, subfolder, type}` descriptors. These helpers answer the
//! questions the gateway keeps asking: is the entry ready, what images
//! does it reference, did the run fail remotely.

use serde_json::Value;

/// Reference to one output image inside a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub filename: String,
    pub subfolder: String,
}

/// Unwrap a `/history/{prompt_id}` response to the entry itself.
///
/// Handles both remote shapes: `{"history": {"<id>": {...}}}` and the
/// flat `{"<id>": {...}}`.
pub fn extract_entry(data: &Value, prompt_id: &str) -> Option<Value> {
    if let Some(entry) = data.get("history").and_then(|h| h.get(prompt_id)) {
        return Some(entry.clone());
    }
    data.get(prompt_id).cloned()
}

/// Whether any output node reports at least one image.
pub fn has_images(entry: &Value) -> bool {
    output_nodes(entry).any(|node| {
        node.get("images")
            .and_then(Value::as_array)
            .is_some_and(|images| !images.is_empty())
    })
}

/// Ordered image descriptors across all output nodes.
///
/// Records without a `filename` are skipped; a missing `subfolder`
/// defaults to the output root.
pub fn image_descriptors(entry: &Value) -> Vec<ImageDescriptor> {
    let mut descriptors = Vec::new();
    for node in output_nodes(entry) {
        let Some(images) = node.get("images").and_then(Value::as_array) else {
            continue;
        };
        for image in images {
            let Some(filename) = image.get("filename").and_then(Value::as_str) else {
                continue;
            };
            let subfolder = image
                .get("subfolder")
                .and_then(Value::as_str)
                .unwrap_or("");
            descriptors.push(ImageDescriptor {
                filename: filename.to_string(),
                subfolder: subfolder.to_string(),
            });
        }
    }
    descriptors
}

/// Execution error reported by the entry, if any.
///
/// Checks the `errors` key first, then `error`. Empty containers and
/// empty strings count as "no error".
pub fn remote_error(entry: &Value) -> Option<String> {
    for key in ["errors", "error"] {
        if let Some(value) = entry.get(key) {
            if !is_empty_value(value) {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn output_nodes(entry: &Value) -> impl Iterator<Item = &Value> {
    entry
        .get("outputs")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|outputs| outputs.values())
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
