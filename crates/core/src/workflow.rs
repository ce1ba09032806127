//! Workflow template loading and rendering.
//!
//! A workflow template is an arbitrary JSON structure containing
//! placeholder tokens. Rendering substitutes every occurrence with the
//! user's inputs: a string that *is* a placeholder becomes the value in
//! its native JSON type (seed stays an integer), a string that merely
//! *contains* one gets textual interpolation. A template with no
//! placeholder anywhere is rejected, so an unmodified workflow is never
//! sent to the gateway by accident.

use std::path::{Path, PathBuf};

use serde_json::Value;

pub const PLACEHOLDER_POSITIVE_PROMPT: &str = "{{positive_prompt}}";
pub const PLACEHOLDER_NEGATIVE_PROMPT: &str = "{{negative_prompt}}";
pub const PLACEHOLDER_SEED: &str = "{{seed}}";
pub const PLACEHOLDER_WIDTH: &str = "{{width}}";
pub const PLACEHOLDER_HEIGHT: &str = "{{height}}";

/// Errors raised while loading or rendering a workflow template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Workflow template not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read workflow template: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workflow template is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(
        "Workflow template did not contain any placeholders to replace; \
         include tokens like {{{{positive_prompt}}}} or {{{{seed}}}}"
    )]
    NoPlaceholders,
}

/// User inputs substituted into a workflow template.
#[derive(Debug, Clone)]
pub struct WorkflowInputs {
    pub positive_prompt: String,
    pub negative_prompt: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
}

/// Load a workflow template JSON file from disk.
pub fn load_workflow(path: &Path) -> Result<Value, TemplateError> {
    if !path.exists() {
        return Err(TemplateError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Apply user inputs to a workflow template.
///
/// The template itself is never mutated; the rendered structure is
/// rebuilt node by node. Fails with [`TemplateError::NoPlaceholders`]
/// when no token was found anywhere in the structure.
pub fn render_workflow(template: &Value, inputs: &WorkflowInputs) -> Result<Value, TemplateError> {
    let replacements: [(&str, Value); 5] = [
        (
            PLACEHOLDER_POSITIVE_PROMPT,
            Value::from(inputs.positive_prompt.clone()),
        ),
        (
            PLACEHOLDER_NEGATIVE_PROMPT,
            Value::from(inputs.negative_prompt.clone()),
        ),
        (PLACEHOLDER_SEED, Value::from(inputs.seed)),
        (PLACEHOLDER_WIDTH, Value::from(inputs.width)),
        (PLACEHOLDER_HEIGHT, Value::from(inputs.height)),
    ];

    let (rendered, replaced) = substitute(template, &replacements);
    if !replaced {
        return Err(TemplateError::NoPlaceholders);
    }
    Ok(rendered)
}

/// Recursively substitute placeholders; returns the new node and
/// whether any replacement happened beneath it.
fn substitute(node: &Value, replacements: &[(&str, Value)]) -> (Value, bool) {
    match node {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            let mut replaced = false;
            for (key, value) in map {
                let (new_value, changed) = substitute(value, replacements);
                out.insert(key.clone(), new_value);
                replaced |= changed;
            }
            (Value::Object(out), replaced)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            let mut replaced = false;
            for value in items {
                let (new_value, changed) = substitute(value, replacements);
                out.push(new_value);
                replaced |= changed;
            }
            (Value::Array(out), replaced)
        }
        Value::String(text) => {
            // Exact match keeps the native type of the replacement.
            if let Some((_, value)) = replacements.iter().find(|(token, _)| text == token) {
                return (value.clone(), true);
            }
            let mut out = text.clone();
            for (token, value) in replacements {
                if out.contains(token) {
                    out = out.replace(token, &scalar_text(value));
                }
            }
            let changed = out != *text;
            (Value::String(out), changed)
        }
        other => (other.clone(), false),
    }
}

/// Textual form of a replacement value for substring interpolation.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn inputs() -> WorkflowInputs {
        WorkflowInputs {
            positive_prompt: "a red fox".into(),
            negative_prompt: "lowres".into(),
            seed: 42,
            width: 512,
            height: 768,
        }
    }

    fn full_template() -> Value {
        json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {"seed": "{{seed}}", "steps": 20}
            },
            "5": {
                "class_type": "EmptyLatentImage",
                "inputs": {"width": "{{width}}", "height": "{{height}}"}
            },
            "6": {"inputs": {"text": "{{positive_prompt}}"}},
            "7": {"inputs": {"text": "{{negative_prompt}}"}}
        })
    }

    #[test]
    fn replaces_all_placeholders_in_one_pass() {
        let rendered = render_workflow(&full_template(), &inputs()).unwrap();
        assert_eq!(rendered["3"]["inputs"]["seed"], json!(42));
        assert_eq!(rendered["5"]["inputs"]["width"], json!(512));
        assert_eq!(rendered["5"]["inputs"]["height"], json!(768));
        assert_eq!(rendered["6"]["inputs"]["text"], json!("a red fox"));
        assert_eq!(rendered["7"]["inputs"]["text"], json!("lowres"));
    }

    #[test]
    fn exact_match_keeps_native_type() {
        let rendered = render_workflow(&full_template(), &inputs()).unwrap();
        assert!(rendered["3"]["inputs"]["seed"].is_i64());
        assert!(rendered["5"]["inputs"]["width"].is_u64());
    }

    #[test]
    fn substring_placeholder_is_interpolated() {
        let template = json!({"6": {"inputs": {"text": "masterpiece, {{positive_prompt}}, 8k"}}});
        let rendered = render_workflow(&template, &inputs()).unwrap();
        assert_eq!(
            rendered["6"]["inputs"]["text"],
            json!("masterpiece, a red fox, 8k")
        );
    }

    #[test]
    fn numeric_substring_interpolates_as_text() {
        let template = json!({"note": "seed={{seed}} size={{width}}x{{height}}"});
        let rendered = render_workflow(&template, &inputs()).unwrap();
        assert_eq!(rendered["note"], json!("seed=42 size=512x768"));
    }

    #[test]
    fn placeholders_inside_arrays_are_replaced() {
        let template = json!({"prompts": ["{{positive_prompt}}", "static"]});
        let rendered = render_workflow(&template, &inputs()).unwrap();
        assert_eq!(rendered["prompts"][0], json!("a red fox"));
        assert_eq!(rendered["prompts"][1], json!("static"));
    }

    #[test]
    fn template_without_placeholders_is_rejected() {
        let template = json!({"3": {"inputs": {"seed": 1234}}});
        assert_matches!(
            render_workflow(&template, &inputs()),
            Err(TemplateError::NoPlaceholders)
        );
    }

    #[test]
    fn input_template_is_not_mutated() {
        let template = full_template();
        let before = template.clone();
        let _ = render_workflow(&template, &inputs()).unwrap();
        assert_eq!(template, before);
    }

    #[test]
    fn load_workflow_missing_file() {
        let missing = std::path::Path::new("does/not/exist.json");
        assert_matches!(load_workflow(missing), Err(TemplateError::NotFound(_)));
    }

    #[test]
    fn load_workflow_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, r#"{"6": {"inputs": {"text": "{{positive_prompt}}"}}}"#).unwrap();
        let template = load_workflow(&path).unwrap();
        assert_eq!(template["6"]["inputs"]["text"], json!("{{positive_prompt}}"));
    }

    #[test]
    fn load_workflow_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        std::fs::write(&path, "not json").unwrap();
        assert_matches!(load_workflow(&path), Err(TemplateError::Parse(_)));
    }
}
