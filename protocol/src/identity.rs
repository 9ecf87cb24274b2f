//! Identity resolution: logical names to keys and addresses.

use async_trait::async_trait;
use dashmap::DashMap;

use accord_common::{AccordError, Party, PartyName, Result};

/// A party together with where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParty {
    pub party: Party,
    pub address: String,
}

/// Directory of well-known parties.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolve a logical name.
    async fn resolve(&self, name: &PartyName) -> Result<ResolvedParty>;

    /// The notary parties should use.
    fn notary(&self) -> Party;
}

/// In-memory network map.
pub struct NetworkMap {
    parties: DashMap<PartyName, ResolvedParty>,
    notary: Party,
}

impl NetworkMap {
    /// Create a map whose designated notary is `notary`.
    pub fn new(notary: Party) -> Self {
        let map = Self {
            parties: DashMap::new(),
            notary: notary.clone(),
        };
        map.register(notary, "memory://notary");
        map
    }

    /// Add or replace a party.
    pub fn register(&self, party: Party, address: impl Into<String>) {
        let resolved = ResolvedParty {
            party: party.clone(),
            address: address.into(),
        };
        self.parties.insert(party.name, resolved);
    }

    /// Every registered party, sorted by name.
    pub fn parties(&self) -> Vec<Party> {
        let mut parties: Vec<Party> = self
            .parties
            .iter()
            .map(|entry| entry.value().party.clone())
            .collect();
        parties.sort_by(|a, b| a.name.cmp(&b.name));
        parties
    }
}

#[async_trait]
impl IdentityService for NetworkMap {
    async fn resolve(&self, name: &PartyName) -> Result<ResolvedParty> {
        self.parties
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AccordError::UnknownParty(name.clone()))
    }

    fn notary(&self) -> Party {
        self.notary.clone()
    }
}
