//! Content digests
//!
//! Stored pictograms are fingerprinted by their raw bytes; import manifests
//! by their canonical JSON (object keys sorted at every depth, compact).

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_string(&sorted(tree))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            Value::Object(fields.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Digest of an import manifest. The `manifest_hash` field is blanked first
/// so a stored manifest can be re-verified.
pub fn compute_manifest_hash<T: Serialize>(manifest: &T) -> Result<String, serde_json::Error> {
    let mut tree = serde_json::to_value(manifest)?;
    if let Some(field) = tree.get_mut("manifest_hash") {
        *field = Value::String(String::new());
    }
    Ok(sha256_hex(serde_json::to_string(&sorted(tree))?.as_bytes()))
}

mod hex {
    use std::fmt::Write as _;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_keys_are_sorted() {
        let form = json!({"variant": 1, "name": "Tree", "pict": {"width": 100, "height": 100}});
        assert_eq!(
            canonical_json(&form).unwrap(),
            r#"{"name":"Tree","pict":{"height":100,"width":100},"variant":1}"#
        );
    }

    #[test]
    fn empty_input_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn manifest_hash_ignores_key_order_and_previous_hash() {
        let a = json!({"imported": [{"name": "Tree", "variant": 0}], "dry_run": false, "manifest_hash": ""});
        let b = json!({"dry_run": false, "manifest_hash": "abc", "imported": [{"variant": 0, "name": "Tree"}]});
        assert_eq!(compute_manifest_hash(&a).unwrap(), compute_manifest_hash(&b).unwrap());
    }
}
