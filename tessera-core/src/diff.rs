//! Structural diff between two version configs.
//!
//! Read-only and side-effect free; used for display and promotion
//! confirmation screens.

use crate::{Version, VersionConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path label used when the config roots themselves differ.
const ROOT_PATH: &str = "$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One changed field, addressed by a dotted path (`model.temperature`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCount {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl ChangeCount {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub has_changes: bool,
    pub change_count: ChangeCount,
    pub summary: String,
    pub changes: Vec<FieldChange>,
}

/// Compare two configs field by field. Nested objects are walked; arrays and
/// scalars are compared as whole values.
pub fn diff_configs(a: &VersionConfig, b: &VersionConfig) -> VersionDiff {
    let mut changes = Vec::new();
    walk(a.as_value(), b.as_value(), None, &mut changes);

    let mut change_count = ChangeCount::default();
    for change in &changes {
        match change.kind {
            ChangeKind::Added => change_count.added += 1,
            ChangeKind::Removed => change_count.removed += 1,
            ChangeKind::Modified => change_count.modified += 1,
        }
    }

    VersionDiff {
        has_changes: !changes.is_empty(),
        summary: summarize(&change_count),
        change_count,
        changes,
    }
}

/// Diff two versions' configs, prefixing the summary with their numbers.
pub fn diff_versions(a: &Version, b: &Version) -> VersionDiff {
    let mut diff = diff_configs(&a.config, &b.config);
    diff.summary = format!(
        "v{} -> v{}: {}",
        a.version_number, b.version_number, diff.summary
    );
    diff
}

fn walk(a: &Value, b: &Value, path: Option<&str>, out: &mut Vec<FieldChange>) {
    match (a, b) {
        (Value::Object(left), Value::Object(right)) => {
            let mut keys: Vec<&String> = left.keys().chain(right.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = match path {
                    Some(p) => format!("{}.{}", p, key),
                    None => key.clone(),
                };
                match (left.get(key), right.get(key)) {
                    (Some(l), Some(r)) => walk(l, r, Some(&child), out),
                    (None, Some(r)) => out.push(FieldChange {
                        path: child,
                        kind: ChangeKind::Added,
                        before: None,
                        after: Some(r.clone()),
                    }),
                    (Some(l), None) => out.push(FieldChange {
                        path: child,
                        kind: ChangeKind::Removed,
                        before: Some(l.clone()),
                        after: None,
                    }),
                    (None, None) => {}
                }
            }
        }
        _ if a != b => out.push(FieldChange {
            path: path.unwrap_or(ROOT_PATH).to_string(),
            kind: ChangeKind::Modified,
            before: Some(a.clone()),
            after: Some(b.clone()),
        }),
        _ => {}
    }
}

fn summarize(count: &ChangeCount) -> String {
    if count.total() == 0 {
        return "No changes".to_string();
    }
    let noun = if count.total() == 1 { "change" } else { "changes" };
    format!(
        "{} {} ({} added, {} removed, {} modified)",
        count.total(),
        noun,
        count.added,
        count.removed,
        count.modified
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(v: Value) -> VersionConfig {
        VersionConfig::new(v)
    }

    #[test]
    fn test_identical_configs() {
        let a = cfg(json!({"temp": 0.7, "prompt": {"system": "x"}}));
        let diff = diff_configs(&a, &a.clone());
        assert!(!diff.has_changes);
        assert_eq!(diff.change_count.total(), 0);
        assert_eq!(diff.summary, "No changes");
    }

    #[test]
    fn test_counts_each_kind() {
        let a = cfg(json!({"temp": 0.7, "old": true, "prompt": {"system": "x"}}));
        let b = cfg(json!({"temp": 0.9, "new": 1, "prompt": {"system": "y"}}));
        let diff = diff_configs(&a, &b);
        assert!(diff.has_changes);
        assert_eq!(
            diff.change_count,
            ChangeCount {
                added: 1,
                removed: 1,
                modified: 2
            }
        );
        let paths: Vec<&str> = diff.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["new", "old", "prompt.system", "temp"]);
        assert_eq!(diff.summary, "4 changes (1 added, 1 removed, 2 modified)");
    }

    #[test]
    fn test_arrays_compared_whole() {
        let a = cfg(json!({"stop": ["a", "b"]}));
        let b = cfg(json!({"stop": ["b", "a"]}));
        let diff = diff_configs(&a, &b);
        assert_eq!(diff.change_count.modified, 1);
        assert_eq!(diff.changes[0].path, "stop");
    }

    #[test]
    fn test_object_replaced_by_scalar() {
        let a = cfg(json!({"schema": {"type": "object"}}));
        let b = cfg(json!({"schema": null}));
        let diff = diff_configs(&a, &b);
        assert_eq!(diff.change_count.modified, 1);
        assert_eq!(diff.changes[0].before, Some(json!({"type": "object"})));
    }

    #[test]
    fn test_non_object_roots() {
        let diff = diff_configs(&cfg(json!(1)), &cfg(json!(2)));
        assert_eq!(diff.changes[0].path, "$");
    }
}
