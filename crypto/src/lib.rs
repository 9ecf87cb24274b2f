//! Accord Cryptographic Primitives
//!
//! Ed25519 identities and signatures for transaction signing, plus the
//! SHA-256 helpers used to derive transaction ids.

pub mod hash;
pub mod signing;

pub use hash::{sha256, sha256_hex};
pub use signing::{PublicKey, Signature, SigningKey};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signature key mismatch: expected {expected}, got {actual}")]
    KeyMismatch { expected: String, actual: String },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
