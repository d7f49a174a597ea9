//! Canonical JSON encoding used on both sides of a signature.
//!
//! Canonicalize once, then treat the result as an opaque byte string: no
//! other canonicalization is performed anywhere else in the pipeline. MESH
//! canonicalizes by recursively sorting object keys and serializing with
//! `serde_json`'s compact (no whitespace) writer. Both `sign` and `verify`
//! go through this function, so the sign/verify round trip holds by
//! construction.

use serde_json::Value;

/// Recursively sort every object's keys, leaving arrays and scalars as-is.
pub fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), sort_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Canonical compact JSON bytes for `value` with key-sorting applied.
pub fn encode(value: &Value) -> Vec<u8> {
    serde_json::to_vec(&sort_keys(value)).expect("Value serialization cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_encoding() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn nested_objects_are_sorted_too() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(encode(&a), encode(&b));
    }
}
