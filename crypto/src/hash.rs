//! Cryptographic hash functions.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 hash and return as hex string.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let hash = sha256(b"hello");
        let hex = sha256_hex(b"hello");

        assert_eq!(hash.len(), 32);
        assert_eq!(
            hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_empty_input() {
        let hash = sha256(b"");
        assert_eq!(hash.len(), 32);
        assert_ne!(hash, sha256(b"\0"));
    }
}
