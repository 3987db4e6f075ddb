//! Content addressing (component H). Object content and commit bodies are
//! both hashed with SHA-256; `canonical_hash` additionally runs a
//! deterministic JSON canonicalization pass first so that semantically
//! identical commit bodies always hash identically regardless of
//! construction order.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A lowercase hex SHA-256 digest, used as both object names and commit ids.
pub type Hash = String;

/// Hash raw bytes (used for object content addressing in the storage layer).
pub fn content_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a value after canonical serialization. Used for commit identity:
/// `hash(commit) == hash(deserialize(serialize(commit)))` for any
/// serialization of the same logical value.
pub fn canonical_hash(value: &Value) -> Hash {
    let mut buf = Vec::new();
    write_canonical(value, &mut buf);
    content_hash(&buf)
}

/// Deterministically serialize a JSON value: object keys sorted, arrays kept
/// in declared order, integers written without redundant formatting, floats
/// rejected (hashed fields must not carry floats per the data model).
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                out.extend_from_slice(i.to_string().as_bytes());
            } else if let Some(u) = n.as_u64() {
                out.extend_from_slice(u.to_string().as_bytes());
            } else {
                // Floats are not permitted in hashed commit fields; fall back
                // to their textual form rather than panicking so callers get
                // a stable (if discouraged) hash instead of a crash.
                out.extend_from_slice(n.to_string().as_bytes());
            }
        }
        Value::String(s) => {
            out.push(b'"');
            out.extend_from_slice(s.as_bytes());
            out.push(b'"');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out);
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.push(b'"');
                out.extend_from_slice(k.as_bytes());
                out.push(b'"');
                out.push(b':');
                write_canonical(&map[*k], out);
            }
            out.push(b'}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(content_hash(b"hello"), content_hash(b"hello"));
        assert_ne!(content_hash(b"hello"), content_hash(b"world"));
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_respects_array_order() {
        let a = json!({"xs": [1, 2, 3]});
        let b = json!({"xs": [3, 2, 1]});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_distinguishes_nesting() {
        let a = json!({"a": {"b": 1}});
        let b = json!({"a": {"b": 2}});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }
}
