//! Content fingerprints for change detection.
//!
//! Persisted digests are SHA-256 hex strings; switching algorithms would
//! invalidate every stored digest.

use sha2::{Digest, Sha256};

/// Length of a rendered digest in hex characters
pub const DIGEST_LEN: usize = 64;

/// Fingerprint a file's full textual content.
pub fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fixed_length() {
        assert_eq!(digest("").len(), DIGEST_LEN);
        assert_eq!(digest(&"x".repeat(10_000)).len(), DIGEST_LEN);
    }

    #[test]
    fn test_distinguishes_content() {
        assert_eq!(digest("A"), digest("A"));
        assert_ne!(digest("A"), digest("B"));
        assert_ne!(digest("A"), digest("A\n"));
    }
}
