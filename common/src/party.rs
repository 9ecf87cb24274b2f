//! Network parties.

use std::fmt;

use accord_crypto::PublicKey;
use serde::{Deserialize, Serialize};

use crate::PartyName;

/// A named participant together with the key it signs with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Logical name on the network.
    pub name: PartyName,
    /// Ed25519 key owned by the party.
    pub key: PublicKey,
}

impl Party {
    /// Create a new party.
    pub fn new(name: impl Into<PartyName>, key: PublicKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    /// Stable textual form used in transaction hashing.
    pub fn canonical(&self) -> String {
        format!("{}@{}", self.name, self.key.to_hex())
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key.key_id())
    }
}
