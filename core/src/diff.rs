//! Change detection between two versions of a watched content blob.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

/// One changed key between two versions of a blob. `old_value` is `None`
/// for added keys and `new_value` is `None` for removed keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            path: path.into(),
            old_value,
            new_value,
        }
    }
}

/// How a watcher turns (old, new) content into a change list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStrategy {
    /// Recursive key/value comparison of two JSON objects.
    #[default]
    Structural,
    /// Only the fact that the content changed matters.
    None,
}

impl DiffStrategy {
    pub fn diff(self, old: &str, new: &str) -> Vec<ChangeRecord> {
        match self {
            DiffStrategy::Structural => {
                let old = parse_object(old);
                let new = parse_object(new);
                diff_objects(&old, &new)
            }
            DiffStrategy::None => Vec::new(),
        }
    }
}

/// Structural diff of two JSON objects, keys joined with `.`.
pub fn diff_objects(old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();
    collect_changes(old, new, "", &mut changes);
    changes
}

fn collect_changes(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    prefix: &str,
    out: &mut Vec<ChangeRecord>,
) {
    for (key, old_value) in old {
        let path = format!("{prefix}{key}");
        match new.get(key) {
            None => out.push(ChangeRecord::new(path, Some(old_value.clone()), None)),
            Some(Value::Object(new_map)) if old_value.is_object() => {
                if let Value::Object(old_map) = old_value {
                    collect_changes(old_map, new_map, &format!("{path}."), out);
                }
            }
            Some(new_value) if new_value != old_value => out.push(ChangeRecord::new(
                path,
                Some(old_value.clone()),
                Some(new_value.clone()),
            )),
            Some(_) => {}
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.push(ChangeRecord::new(
                format!("{prefix}{key}"),
                None,
                Some(new_value.clone()),
            ));
        }
    }
}

/// Parses a blob as a JSON object. Anything else diffs as an empty object.
fn parse_object(raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!("watched content is not a JSON object; diffing as empty");
            Map::new()
        }
        Err(err) => {
            warn!(error = %err, "failed to parse watched content as JSON; diffing as empty");
            Map::new()
        }
    }
}
