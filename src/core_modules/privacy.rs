//! Pure privacy checks for records leaving the engine.
//!
//! Nothing here holds state. A record either passes the forbidden-field check
//! or reports the first offending key path.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Key fragments that must never appear in an exported record.
pub const FORBIDDEN_FIELDS: [&str; 9] = [
    "ip_address",
    "device_id",
    "imei",
    "serial",
    "mac_address",
    "phone",
    "email",
    "gps",
    "location",
];

const USERNAME_HASH_LEN: usize = 16;

/// Returns the path of the first key that contains a forbidden fragment
/// (case-insensitive), or `None` when the record is clean.
pub fn find_pii(record: &Value) -> Option<String> {
    find_pii_at(record, "$")
}

fn find_pii_at(value: &Value, path: &str) -> Option<String> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, child)| {
            let child_path = format!("{path}.{key}");
            let lowered = key.to_ascii_lowercase();
            if FORBIDDEN_FIELDS.iter().any(|field| lowered.contains(field)) {
                Some(child_path)
            } else {
                find_pii_at(child, &child_path)
            }
        }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(index, item)| find_pii_at(item, &format!("{path}[{index}]"))),
        _ => None,
    }
}

pub fn validate_no_pii(record: &Value) -> bool {
    find_pii(record).is_none()
}

/// Anonymises a username as the first 16 hex characters of its SHA-256 digest.
pub fn hash_username(username: &str) -> String {
    let digest = Sha256::digest(username.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(USERNAME_HASH_LEN);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_record_passes() {
        let record = json!({
            "metadata": {"timestamp": "2025-01-01T00:00:00Z", "total_patterns": 3},
            "players": [{"name": "Player 1", "score": 15}],
        });
        assert!(validate_no_pii(&record));
    }

    #[test]
    fn nested_forbidden_key_is_reported() {
        let record = json!({
            "players": [{"name": "Player 1"}, {"name": "Player 2", "Email_Address": "x"}],
        });
        assert!(!validate_no_pii(&record));
        assert_eq!(find_pii(&record).as_deref(), Some("$.players[1].Email_Address"));
    }

    #[test]
    fn values_are_not_inspected() {
        assert!(validate_no_pii(&json!({"note": "gps location"})));
        assert!(validate_no_pii(&json!(["phone", 1, null])));
    }

    #[test]
    fn username_hash_is_truncated_sha256() {
        let hashed = hash_username("alice");
        assert_eq!(hashed.len(), 16);
        assert_eq!(hashed, "2bd806c97f0e00af");
        assert_ne!(hash_username("bob"), hashed);
    }
}
