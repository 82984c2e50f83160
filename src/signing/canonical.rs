//! Canonical request bodies
//!
//! Object keys are sorted recursively; arrays keep their order and scalar
//! values are written exactly as `serde_json` prints them.

use serde_json::Value;

/// Canonical form of a request body.
///
/// An empty body canonicalizes to `{}`. A body that is not JSON is used
/// verbatim.
pub fn canonicalize_body(body: &[u8]) -> Vec<u8> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return b"{}".to_vec();
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) => canonical_json(&value).into_bytes(),
        Err(_) => body.to_vec(),
    }
}

/// Serialize a JSON value with object keys sorted at every depth
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are strings, serialization cannot fail
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(&map[key], out);
            }
            out.push('}');
        }
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
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_recursively() {
        let value = json!({
            "walletId": "w",
            "amount": 100,
            "meta": {"z": 1, "a": [ {"y": true, "b": null} ]}
        });
        assert_eq!(
            canonical_json(&value),
            r#"{"amount":100,"meta":{"a":[{"b":null,"y":true}],"z":1},"walletId":"w"}"#
        );
    }

    #[test]
    fn test_array_order_preserved() {
        assert_eq!(canonical_json(&json!([3, 1, 2])), "[3,1,2]");
    }

    #[test]
    fn test_whitespace_and_key_order_do_not_matter() {
        let a = canonicalize_body(br#"{ "b": 1,  "a": "x" }"#);
        let b = canonicalize_body(br#"{"a":"x","b":1}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        assert_eq!(canonicalize_body(b""), b"{}");
        assert_eq!(canonicalize_body(b"  \n"), b"{}");
    }

    #[test]
    fn test_non_json_body_verbatim() {
        assert_eq!(canonicalize_body(b"not json {"), b"not json {".to_vec());
    }

    #[test]
    fn test_strings_are_escaped() {
        let value = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"k\"ey":"line\nbreak"}"#);
    }
}
