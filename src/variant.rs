//! Tagged value representation for semi-structured document payloads: a
//! binary `metadata` header plus a binary `value` payload, modeled as a
//! Rust enum rather than a language-native dynamic object so every
//! encode/decode path goes through one place.

use crate::error::{DbError, Result};
use serde_json::Value;

/// The physical type a shredded field's `typed_value` leaf was promoted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Int32,
    Int64,
    Double,
    Boolean,
    TimestampMillis,
    Utf8,
    Json,
}

impl VariantType {
    /// Detect the narrowest promotable type for an observed JSON value.
    /// Numbers above `2^53 - 1` (the float-safe integer boundary) promote to
    /// `Int64` rather than `Int32`; nested objects and arrays degrade to
    /// JSON-encoded UTF-8.
    pub fn detect(value: &Value) -> Self {
        const MAX_SAFE_INT: i64 = (1i64 << 53) - 1;
        match value {
            Value::Bool(_) => VariantType::Boolean,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i.unsigned_abs() <= MAX_SAFE_INT as u64 && i32::try_from(i).is_ok() {
                        VariantType::Int32
                    } else {
                        VariantType::Int64
                    }
                } else {
                    VariantType::Double
                }
            }
            Value::String(_) => VariantType::Utf8,
            Value::Null | Value::Array(_) | Value::Object(_) => VariantType::Json,
        }
    }
}

/// A decoded variant: the raw metadata header plus either a typed payload
/// (for a promoted field) or an opaque residual payload (for unshredded
/// fields carried in a root `value` leaf).
#[derive(Debug, Clone)]
pub struct Variant {
    pub metadata: Vec<u8>,
    pub value: Value,
}

impl Variant {
    /// Encode a JSON value into a variant: metadata carries a one-byte
    /// version tag, value carries the JSON payload as UTF-8 bytes. This is
    /// intentionally simple (no dictionary-encoded field names) since the
    /// shredded columns, not the residual payload, carry query-relevant
    /// structure.
    pub fn encode(value: &Value) -> Result<(Vec<u8>, Vec<u8>)> {
        let metadata = vec![1u8];
        let payload = serde_json::to_vec(value)?;
        Ok((metadata, payload))
    }

    pub fn decode(metadata: &[u8], payload: &[u8]) -> Result<Variant> {
        if metadata.first() != Some(&1u8) {
            return Err(DbError::Corruption("unsupported variant metadata version".into()));
        }
        let value: Value = if payload.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(payload)?
        };
        Ok(Variant {
            metadata: metadata.to_vec(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detect_small_integer_is_int32() {
        assert_eq!(VariantType::detect(&json!(42)), VariantType::Int32);
    }

    #[test]
    fn detect_large_integer_is_int64() {
        assert_eq!(VariantType::detect(&json!(9_007_199_254_740_993i64)), VariantType::Int64);
    }

    #[test]
    fn detect_float_is_double() {
        assert_eq!(VariantType::detect(&json!(3.14)), VariantType::Double);
    }

    #[test]
    fn detect_nested_degrades_to_json() {
        assert_eq!(VariantType::detect(&json!({"a": 1})), VariantType::Json);
        assert_eq!(VariantType::detect(&json!([1, 2])), VariantType::Json);
    }

    #[test]
    fn encode_decode_round_trip() {
        let value = json!({"name": "a", "count": 3});
        let (metadata, payload) = Variant::encode(&value).unwrap();
        let decoded = Variant::decode(&metadata, &payload).unwrap();
        assert_eq!(decoded.value, value);
    }

    #[test]
    fn decode_rejects_unknown_metadata_version() {
        assert!(Variant::decode(&[9], b"{}").is_err());
    }
}
