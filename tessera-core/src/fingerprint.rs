//! Request fingerprints for the response cache.
//!
//! A fingerprint identifies one exact (tenant, process, input) triple. The
//! input is canonicalized first so that two JSON objects differing only in
//! key order hash identically.

use crate::{compute_content_hash, ProcessId, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Domain separator mixed into every fingerprint.
const FINGERPRINT_DOMAIN: &[u8] = b"tessera.fingerprint.v1";

/// Hex-encoded SHA-256 fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an already computed fingerprint (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a validated input for a tenant's process.
pub fn fingerprint(tenant_id: TenantId, process_id: ProcessId, input: &Value) -> Fingerprint {
    let canonical = canonical_json(input);
    let mut buf = Vec::with_capacity(FINGERPRINT_DOMAIN.len() + 33 + canonical.len());
    buf.extend_from_slice(FINGERPRINT_DOMAIN);
    buf.push(0);
    buf.extend_from_slice(tenant_id.as_bytes());
    buf.extend_from_slice(process_id.as_bytes());
    buf.extend_from_slice(canonical.as_bytes());
    Fingerprint(hex::encode(compute_content_hash(&buf)))
}

/// Render a JSON value with object keys sorted at every depth.
///
/// Array order is significant and preserved.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json's Display gives compact, escaped scalars
                out.push_str(&Value::from(key.as_str()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_key_order_does_not_matter() {
        let tenant = Uuid::now_v7();
        let process = Uuid::now_v7();
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": [1, 2], "x": "s"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": "s", "y": [1, 2]}, "b": 1}"#).unwrap();
        assert_eq!(fingerprint(tenant, process, &a), fingerprint(tenant, process, &b));
    }

    #[test]
    fn test_array_order_matters() {
        let tenant = Uuid::now_v7();
        let process = Uuid::now_v7();
        let a = json!({"items": [1, 2]});
        let b = json!({"items": [2, 1]});
        assert_ne!(fingerprint(tenant, process, &a), fingerprint(tenant, process, &b));
    }

    #[test]
    fn test_scoped_by_tenant_and_process() {
        let input = json!({"q": "hello"});
        let t1 = Uuid::now_v7();
        let t2 = Uuid::now_v7();
        let p = Uuid::now_v7();
        assert_ne!(fingerprint(t1, p, &input), fingerprint(t2, p, &input));
        assert_ne!(fingerprint(t1, p, &input), fingerprint(t1, Uuid::now_v7(), &input));
    }

    #[test]
    fn test_canonical_json_escapes() {
        let v = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonical_json(&v), r#"{"k\"ey":"line\nbreak"}"#);
        assert_eq!(
            canonical_json(&json!({"c": "\u{1}", "b": [true, null, 1.5]})),
            r#"{"b":[true,null,1.5],"c":"\u0001"}"#
        );
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(Uuid::nil(), Uuid::nil(), &json!({}));
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Map;

    fn entries_strategy() -> impl Strategy<Value = Vec<(String, i64)>> {
        prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..12)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Inserting the same entries in reverse order yields the same fingerprint.
        #[test]
        fn prop_insertion_order_irrelevant(entries in entries_strategy()) {
            let mut forward = Map::new();
            for (k, v) in &entries {
                forward.insert(k.clone(), Value::from(*v));
            }
            let mut backward = Map::new();
            for (k, v) in entries.iter().rev() {
                backward.insert(k.clone(), Value::from(*v));
            }
            let t = uuid::Uuid::nil();
            prop_assert_eq!(
                fingerprint(t, t, &Value::Object(forward)),
                fingerprint(t, t, &Value::Object(backward))
            );
        }

        /// Canonical output of a parsed canonical string is a fixed point.
        #[test]
        fn prop_canonical_is_fixed_point(entries in entries_strategy()) {
            let mut map = Map::new();
            for (k, v) in entries {
                map.insert(k, Value::from(v));
            }
            let once = canonical_json(&Value::Object(map));
            let reparsed: Value = serde_json::from_str(&once).expect("canonical output is JSON");
            prop_assert_eq!(canonical_json(&reparsed), once);
        }
    }
}
