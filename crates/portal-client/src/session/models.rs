//! Read-only projections from the catalog and notebook-hosting services.

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A notebook tag. Depending on backend version the wire shape is either a
/// structured list of `{label, pinned}` objects, a list of plain strings, or
/// a comma-separated string; all three normalize to this at the session
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    #[serde(default)]
    pub pinned: bool,
}

impl Tag {
    pub fn new(label: impl Into<String>, pinned: bool) -> Self {
        Self {
            label: label.into(),
            pinned,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotebookSummary {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub quality: String,
    /// Set on old-style catalog entries that are really GenePattern modules.
    #[serde(default)]
    pub lsid: Option<String>,
    /// Set on new-style published projects; links back to the source project.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lsid: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub suites: Vec<String>,
    #[serde(default)]
    pub documentation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleCategory {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Decoded payload of the module catalog endpoint. Primary slot for the
/// derived category listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleCatalog {
    pub all_modules: Vec<ModuleSummary>,
    pub all_categories: Vec<ModuleCategory>,
}

/// One entry of the top-level user directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceEntry {
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub last_modified: Option<String>,
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<Tag>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(normalize_tags(&value))
}

/// Normalize any backend tag shape into a flat `Vec<Tag>`.
pub fn normalize_tags(value: &Value) -> Vec<Tag> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(label) => {
                    let label = label.trim();
                    (!label.is_empty()).then(|| Tag::new(label, false))
                }
                Value::Object(fields) => {
                    let label = fields.get("label")?.as_str()?.trim();
                    if label.is_empty() {
                        return None;
                    }
                    let pinned = fields
                        .get("pinned")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    Some(Tag::new(label, pinned))
                }
                _ => None,
            })
            .collect(),
        Value::String(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(|label| Tag::new(label, false))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_structured_tag_list() {
        let value = json!([{"label": "featured", "pinned": true}, {"label": "beta"}]);
        assert_eq!(
            normalize_tags(&value),
            vec![Tag::new("featured", true), Tag::new("beta", false)]
        );
    }

    #[test]
    fn normalizes_comma_separated_string() {
        let value = json!("single-cell, rna-seq , ,");
        assert_eq!(
            normalize_tags(&value),
            vec![Tag::new("single-cell", false), Tag::new("rna-seq", false)]
        );
    }

    #[test]
    fn normalizes_plain_string_list() {
        let value = json!(["tutorial", ""]);
        assert_eq!(normalize_tags(&value), vec![Tag::new("tutorial", false)]);
    }

    #[test]
    fn notebook_summary_accepts_either_tag_shape() {
        let structured: NotebookSummary = serde_json::from_value(json!({
            "name": "Example",
            "tags": [{"label": "featured", "pinned": true}]
        }))
        .unwrap();
        assert_eq!(structured.tags, vec![Tag::new("featured", true)]);

        let legacy: NotebookSummary = serde_json::from_value(json!({
            "name": "Example",
            "tags": "a,b"
        }))
        .unwrap();
        assert_eq!(legacy.tags.len(), 2);
    }
}
