//! Tag-dictionary prompt helper.
//!
//! Backs the autocomplete surface for prompt editing: a dictionary of
//! known tags (loaded from a JSON file) searched by prefix, plus the
//! canned negative-prompt presets. A missing dictionary file degrades
//! to an empty dictionary rather than failing startup.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Named negative-prompt presets offered by the surface layer.
pub const NEGATIVE_PRESETS: &[(&str, &str)] = &[
    (
        "standard",
        "lowres, bad anatomy, bad hands, text, error, missing fingers, \
         extra digit, fewer digits, cropped, worst quality, low quality",
    ),
    ("light", "lowres, bad anatomy, error, missing fingers"),
    ("none", ""),
];

/// One dictionary record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagEntry {
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Popularity weight used for ranking.
    #[serde(default)]
    pub post_count: u64,
}

/// In-memory tag dictionary with ranked search.
#[derive(Debug, Default)]
pub struct TagDictionary {
    entries: Vec<TagEntry>,
}

impl TagDictionary {
    pub fn from_entries(entries: Vec<TagEntry>) -> Self {
        Self { entries }
    }

    /// Load a dictionary from a JSON array file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Internal(format!("Failed to read tag dictionary: {e}")))?;
        let entries: Vec<TagEntry> = serde_json::from_str(&text)
            .map_err(|e| CoreError::Internal(format!("Invalid tag dictionary JSON: {e}")))?;
        Ok(Self { entries })
    }

    /// Load from an optional path, falling back to an empty dictionary.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(dict) => {
                    tracing::info!(count = dict.len(), path = %path.display(), "Tag dictionary loaded");
                    dict
                }
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "Tag dictionary unavailable");
                    Self::default()
                }
            },
            None => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Search tags matching `query`, at most `limit` results.
    ///
    /// Prefix matches rank before substring matches; within each group,
    /// higher `post_count` wins. Matching is case-insensitive. An empty
    /// query returns nothing.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&TagEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut prefix: Vec<&TagEntry> = Vec::new();
        let mut inner: Vec<&TagEntry> = Vec::new();
        for entry in &self.entries {
            let name = entry.name.to_lowercase();
            if name.starts_with(&needle) {
                prefix.push(entry);
            } else if name.contains(&needle) {
                inner.push(entry);
            }
        }
        prefix.sort_by(|a, b| b.post_count.cmp(&a.post_count));
        inner.sort_by(|a, b| b.post_count.cmp(&a.post_count));

        prefix.into_iter().chain(inner).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dictionary() -> TagDictionary {
        TagDictionary::from_entries(vec![
            TagEntry {
                name: "cat".into(),
                category: "general".into(),
                post_count: 900,
            },
            TagEntry {
                name: "cat_ears".into(),
                category: "general".into(),
                post_count: 500,
            },
            TagEntry {
                name: "black_cat".into(),
                category: "general".into(),
                post_count: 700,
            },
            TagEntry {
                name: "dog".into(),
                category: "general".into(),
                post_count: 800,
            },
        ])
    }

    #[test]
    fn prefix_matches_rank_before_substring_matches() {
        let dict = dictionary();
        let names: Vec<&str> = dict.search("cat", 10).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "cat_ears", "black_cat"]);
    }

    #[test]
    fn ranking_within_group_is_by_post_count() {
        let dict = dictionary();
        let names: Vec<&str> = dict.search("c", 10).iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["cat", "cat_ears", "black_cat"]);
    }

    #[test]
    fn limit_truncates_results() {
        let dict = dictionary();
        assert_eq!(dict.search("cat", 1).len(), 1);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let dict = dictionary();
        assert!(dict.search("", 10).is_empty());
        assert!(dict.search("   ", 10).is_empty());
    }

    #[test]
    fn search_is_case_insensitive() {
        let dict = dictionary();
        assert_eq!(dict.search("CAT", 10).len(), 3);
    }

    #[test]
    fn load_or_empty_tolerates_missing_file() {
        let dict = TagDictionary::load_or_empty(Some(Path::new("no/such/file.json")));
        assert!(dict.is_empty());
    }

    #[test]
    fn load_reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        std::fs::write(
            &path,
            r#"[{"name": "cat", "category": "general", "post_count": 10}]"#,
        )
        .unwrap();
        let dict = TagDictionary::load(&path).unwrap();
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn presets_include_a_none_option() {
        assert!(NEGATIVE_PRESETS.iter().any(|(name, value)| *name == "none" && value.is_empty()));
    }
}
