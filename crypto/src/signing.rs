//! Digital signature support using Ed25519.

use std::fmt;

use ed25519_dalek::{
    Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey as Ed25519VerifyingKey,
};
use rand::rngs::OsRng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{CryptoError, Result};

/// Algorithm tag carried by every signature.
pub const ALGORITHM: &str = "Ed25519";

/// A party's private signing key.
///
/// Never serialized and never sent over a session; a party shares it only
/// behind an `Arc` with its own flows.
pub struct SigningKey {
    inner: Ed25519SigningKey,
    public_key: PublicKey,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let inner = Ed25519SigningKey::generate(&mut csprng);
        let public_key = PublicKey(inner.verifying_key().to_bytes());

        Self { inner, public_key }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Invalid key length".to_string()))?;

        let inner = Ed25519SigningKey::from_bytes(&bytes);
        let public_key = PublicKey(inner.verifying_key().to_bytes());

        Ok(Self { inner, public_key })
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Get the key ID.
    pub fn key_id(&self) -> String {
        self.public_key.key_id()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.inner.sign(message);
        Signature {
            bytes: sig.to_bytes().to_vec(),
            key: self.public_key,
            algorithm: ALGORITHM.to_string(),
        }
    }

    /// Get raw key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// A public key identifying a signer.
///
/// Serialized as a lowercase hex string so it can key JSON maps.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Create from raw bytes, rejecting points that are not valid Ed25519 keys.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Invalid key length".to_string()))?;

        Ed25519VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self(bytes))
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Short identifier: the first 8 bytes in hex.
    pub fn key_id(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Full key as hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify a signature made by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        if signature.key != *self {
            return Err(CryptoError::KeyMismatch {
                expected: self.key_id(),
                actual: signature.key.key_id(),
            });
        }

        if signature.algorithm != ALGORITHM {
            return Err(CryptoError::InvalidSignature);
        }

        let sig_bytes: [u8; 64] = signature
            .bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;

        let inner = Ed25519VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        inner
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.key_id())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A digital signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Raw signature bytes.
    pub bytes: Vec<u8>,
    /// Key that created this signature.
    pub key: PublicKey,
    /// Algorithm used (always "Ed25519" for now).
    pub algorithm: String,
}

impl Signature {
    /// Get signature as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Create from hex string.
    pub fn from_hex(hex_str: &str, key: PublicKey) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(|_| CryptoError::InvalidSignature)?;

        Ok(Self {
            bytes,
            key,
            algorithm: ALGORITHM.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let signing_key = SigningKey::generate();
        let public_key = signing_key.public_key();

        let message = b"IOU of 10 from A to B";
        let signature = signing_key.sign(message);

        assert!(public_key.verify(message, &signature).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let signing_key = SigningKey::generate();
        let public_key = signing_key.public_key();

        let message = b"IOU of 10 from A to B";
        let mut signature = signing_key.sign(message);

        // Corrupt the signature
        signature.bytes[0] ^= 0xff;

        assert!(public_key.verify(message, &signature).is_err());
    }

    #[test]
    fn test_signature_from_other_key_is_rejected() {
        let alice = SigningKey::generate();
        let bob = SigningKey::generate();

        let signature = bob.sign(b"payload");
        let err = alice.public_key().verify(b"payload", &signature).unwrap_err();

        assert!(matches!(err, CryptoError::KeyMismatch { .. }));
    }

    #[test]
    fn test_key_serialization() {
        let signing_key = SigningKey::generate();
        let bytes = signing_key.to_bytes();

        let restored = SigningKey::from_bytes(&bytes).unwrap();
        assert_eq!(signing_key.key_id(), restored.key_id());
        assert_eq!(signing_key.public_key(), restored.public_key());
    }

    #[test]
    fn test_public_key_json_is_hex() {
        let key = SigningKey::generate().public_key();
        let json = serde_json::to_string(&key).unwrap();

        assert_eq!(json, format!("\"{}\"", key.to_hex()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_signature_hex() {
        let signing_key = SigningKey::generate();
        let signature = signing_key.sign(b"payload");

        let restored = Signature::from_hex(&signature.to_hex(), signing_key.public_key()).unwrap();
        assert_eq!(restored, signature);
    }
}
