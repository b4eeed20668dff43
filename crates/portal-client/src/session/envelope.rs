//! Per-resource envelope adapters.
//!
//! Different backend versions nest the real payload under different outer
//! keys (`results`, `projects`, `content`, ...). Each adapter documents the
//! keys it accepts and unwraps the transport envelope exactly once, at the
//! session boundary.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::models::{ModuleCatalog, NotebookSummary, WorkspaceEntry};
use crate::error::{PortalError, Result};
use crate::projects::Project;

/// Public notebooks: a bare array, or an object wrapping it under `results`
/// (older hosting service) or `projects` (newer portal versions).
pub(super) fn notebooks(value: Value) -> Result<Vec<NotebookSummary>> {
    typed_list(value, &["results", "projects"], "public notebooks")
}

/// Shared notebooks: always wrapped under `results`.
pub(super) fn shared_notebooks(value: Value) -> Result<Vec<NotebookSummary>> {
    typed_list(value, &["results"], "shared notebooks")
}

/// Workspace listing: the hub contents API wraps entries under `content`.
pub(super) fn workspace(value: Value) -> Result<Vec<WorkspaceEntry>> {
    typed_list(value, &["content"], "workspace listing")
}

/// Project listing: the portal returns the array directly, no envelope.
pub(super) fn projects(value: Value) -> Result<Vec<Project>> {
    typed_list(value, &[], "projects")
}

/// Module catalog: one object carrying both `all_modules` and
/// `all_categories`; kept whole as the primary slot payload.
pub(super) fn module_catalog(value: Value) -> Result<ModuleCatalog> {
    serde_json::from_value(value).map_err(PortalError::from)
}

fn typed_list<T: DeserializeOwned>(value: Value, keys: &[&str], resource: &str) -> Result<Vec<T>> {
    let items = unwrap_list(value, keys, resource)?;
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(PortalError::from))
        .collect()
}

fn unwrap_list(value: Value, keys: &[&str], resource: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in keys {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(PortalError::Envelope(format!(
                "{resource}: expected an array or one of {keys:?}"
            )))
        }
        other => Err(PortalError::Envelope(format!(
            "{resource}: expected array or object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notebooks_accepts_bare_array_and_both_envelope_keys() {
        for value in [
            json!([{"name": "A"}]),
            json!({"results": [{"name": "A"}]}),
            json!({"projects": [{"name": "A"}]}),
        ] {
            let decoded = notebooks(value).unwrap();
            assert_eq!(decoded.len(), 1);
            assert_eq!(decoded[0].name, "A");
        }
    }

    #[test]
    fn unknown_envelope_key_is_an_error() {
        let err = notebooks(json!({"items": []})).unwrap_err();
        assert!(matches!(err, PortalError::Envelope(_)));
    }

    #[test]
    fn workspace_unwraps_content_key() {
        let decoded = workspace(json!({"content": [{"name": "intro.ipynb", "type": "notebook"}]}))
            .unwrap();
        assert_eq!(decoded[0].kind, "notebook");
    }

    #[test]
    fn module_catalog_keeps_both_lists() {
        let decoded = module_catalog(json!({
            "all_modules": [{"name": "Cluster", "lsid": "urn:1"}],
            "all_categories": [{"name": "clustering"}]
        }))
        .unwrap();
        assert_eq!(decoded.all_modules.len(), 1);
        assert_eq!(decoded.all_categories.len(), 1);
    }
}
