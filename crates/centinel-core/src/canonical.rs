// crates/centinel-core/src/canonical.rs
//
// Canonical JSON: object keys sorted lexicographically at every depth,
// compact separators, UTF-8 emitted as-is. Used wherever bytes are hashed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::crypto::sha256_hex;
use crate::error::CentinelError;

/// Rebuild `value` with every object's keys in sorted order.
///
/// Entries are re-inserted in sorted order so the result is canonical
/// whether or not serde_json's `preserve_order` feature is active.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key, canonicalize(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serialize any value to canonical JSON bytes.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CentinelError> {
    let tree = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&tree)?)
}

/// SHA-256 hex over the canonical form of `object` with `exclude` removed.
///
/// This is the checksum embedded in local checkpoint files.
pub fn checksum_excluding(object: &Map<String, Value>, exclude: &str) -> Result<String, CentinelError> {
    let mut copy = object.clone();
    copy.remove(exclude);
    let bytes = canonical_json(&Value::Object(copy))?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"z": true, "y": [ {"d": 1, "c": 2} ]}});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"y":[{"c":2,"d":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_keeps_unicode_unescaped() {
        let bytes = canonical_json(&json!({"acta": "Señal"})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "{\"acta\":\"Señal\"}");
    }

    #[test]
    fn test_checksum_excluding_ignores_field_and_order() {
        let first = json!({"acta_id": "A1", "offset": 10, "checksum": "x"});
        let second = json!({"offset": 10, "acta_id": "A1"});
        let a = checksum_excluding(first.as_object().unwrap(), "checksum").unwrap();
        let b = checksum_excluding(second.as_object().unwrap(), "checksum").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex(br#"{"acta_id":"A1","offset":10}"#));
    }
}
