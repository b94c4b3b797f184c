//! Identifier generation: fixed prefix plus random hex suffix.

use chrono::Datelike;
use rand::RngCore;

/// Lowercase hex of `n` random bytes.
fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `INC-<year>-<6 hex>`, e.g. `INC-2026-A41F9C`.
pub fn incident_id() -> String {
    let year = crate::timestamp::now().year();
    format!("INC-{year}-{}", random_hex(3).to_uppercase())
}

/// `EVD-<12 hex>`, e.g. `EVD-9B2C41D07E55`.
pub fn evidence_id() -> String {
    format!("EVD-{}", random_hex(6).to_uppercase())
}

/// Whether `s` is a lowercase hex SHA-256 digest.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incident_id_shape() {
        let id = incident_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INC");
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_evidence_id_shape() {
        let id = evidence_id();
        assert!(id.starts_with("EVD-"));
        assert_eq!(id.len(), 16);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = evidence_id();
        let b = evidence_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_hex_check() {
        assert!(is_sha256_hex(&"a".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}
