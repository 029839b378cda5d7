//! JSON Canonicalization Scheme (RFC 8785), used to serialize the
//! extensible sub-objects (`body`, `constraints`, `bootstrap`, `addrs`) that
//! get embedded as a single netstring inside a signature input (§4.1).
//!
//! This is not a general-purpose JCS library: it covers exactly what
//! `serde_json::Value` can represent, which is what every object in this
//! protocol is serialized to before hashing or signing. Object members are
//! sorted by Unicode scalar value of the member name, which coincides with
//! RFC 8785's UTF-16 code unit ordering for every key used in this protocol
//! (all ASCII). Numbers are rendered via `serde_json`'s default formatting,
//! which already produces the shortest round-tripping decimal form for
//! floats and exact decimal for integers — the cases RFC 8785 and ECMA-262
//! `Number::toString` disagree on (very large exponents) do not arise in
//! this protocol's schemas.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Serialize `value` to JCS-canonical bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    Ok(canonicalize(&v).into_bytes())
}

/// Canonicalize an already-parsed [`Value`] to a JCS string.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_value(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn write_json_string(s: &str, out: &mut String) {
    // serde_json's string serializer already produces minimal, valid JSON
    // escaping (control characters, `"`, `\`), which is all RFC 8785 requires.
    let escaped = serde_json::to_string(s).expect("string serialization is infallible");
    out.push_str(&escaped);
}

/// Parse `bytes` as UTF-8 JSON and re-canonicalize, verifying it round-trips
/// to the same canonical form (used to validate JCS fields received off the
/// wire before trusting them in a signature input).
pub fn validate_canonical(bytes: &[u8]) -> Result<()> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::MalformedNetstring(format!("non-utf8 jcs payload: {e}")))?;
    let value: Value = serde_json::from_str(text)?;
    let recanonical = canonicalize(&value);
    if recanonical.as_bytes() != bytes {
        return Err(Error::MalformedNetstring(
            "payload is not in canonical JCS form".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(canonicalize(&v), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn nested_objects_sorted_recursively() {
        let v = json!({"z": {"y": 1, "x": 2}, "a": 1});
        assert_eq!(canonicalize(&v), r#"{"a":1,"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn empty_object_and_array() {
        assert_eq!(canonicalize(&json!({})), "{}");
        assert_eq!(canonicalize(&json!([])), "[]");
    }

    #[test]
    fn deterministic_across_calls() {
        let v = json!({"m": [3, 1, 2], "a": "hello\nworld"});
        let a = canonicalize(&v);
        let b = canonicalize(&v);
        assert_eq!(a, b);
    }

    #[test]
    fn validate_canonical_roundtrip() {
        let v = json!({"a": 1, "b": [1, 2, 3]});
        let bytes = to_vec(&v).unwrap();
        assert!(validate_canonical(&bytes).is_ok());

        // Non-canonical (unsorted keys, whitespace) must be rejected.
        assert!(validate_canonical(br#"{"b": 1, "a": 2}"#).is_err());
    }
}
