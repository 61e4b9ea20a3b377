use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::Digest;

/// Produce a deterministic canonical JSON representation.
///
/// Object keys are sorted, output is compact, arrays keep their order.
pub fn canonicalize(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(canonicalize).collect();
            format!("[{}]", items.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let pairs: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonicalize(v)))
                .collect();
            format!("{{{}}}", pairs.join(","))
        }
    }
}

/// SHA-256 of the canonical form of `value`.
pub fn canonical_hash(value: &Value) -> Digest {
    Digest(Sha256::digest(canonicalize(value).as_bytes()).into())
}
