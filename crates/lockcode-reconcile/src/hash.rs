//! Content hash identifying a queued change.
//!
//! SHA-256 over `timestamp`, `code` and `username`, in that order. Each field
//! is length-prefixed so that no two distinct triples share an encoding
//! (`("12", "3")` and `("1", "23")` hash differently). The timestamp uses
//! Rust's shortest round-trip float formatting, so `1625079650.0` always
//! renders as `"1625079650.0"`.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of the change's identifying fields.
pub fn request_hash(timestamp: f64, code: &str, username: &str) -> String {
    let timestamp = format!("{timestamp:?}");
    let mut hasher = Sha256::new();
    for field in [timestamp.as_str(), code, username] {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_calls() {
        let a = request_hash(1_625_079_650.0, "1234", "Test Code");
        let b = request_hash(1_625_079_650.0, "1234", "Test Code");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            request_hash(1_625_079_650.0, "1234", "Test Code"),
            "ad0f6abef3c29f4e56db6de6843a5cbd0bc13d51e23a55c679520ba69df3d02e"
        );
    }

    #[test]
    fn every_field_contributes() {
        let base = request_hash(1_625_079_650.0, "1234", "Test Code");
        assert_ne!(base, request_hash(1_625_079_651.0, "1234", "Test Code"));
        assert_ne!(base, request_hash(1_625_079_650.0, "4321", "Test Code"));
        assert_ne!(base, request_hash(1_625_079_650.0, "1234", "Other"));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        assert_ne!(request_hash(1.0, "12", "3"), request_hash(1.0, "1", "23"));
    }

    #[test]
    fn fractional_timestamps_differ() {
        assert_ne!(
            request_hash(1_625_079_650.25, "1234", "Test Code"),
            request_hash(1_625_079_650.5, "1234", "Test Code")
        );
    }
}
