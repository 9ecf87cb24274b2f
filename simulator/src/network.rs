//! In-process network of party nodes sharing one notary.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use accord_common::PartyName;
use accord_crypto::SigningKey;
use accord_notary::{Notary, NotaryConfig};
use accord_party::{PartyConfig, PartyNode};
use accord_protocol::{InMemoryNetwork, NetworkMap, NotaryService};

use crate::scenario::PartySpec;

/// A simulated network.
pub struct SimulatedNetwork {
    pub transport: Arc<InMemoryNetwork>,
    pub map: Arc<NetworkMap>,
    pub notary: Arc<Notary>,
    nodes: BTreeMap<PartyName, Arc<PartyNode>>,
}

impl SimulatedNetwork {
    /// Start a notary and one node per spec.
    pub async fn start(parties: &[PartySpec], template: &PartyConfig) -> anyhow::Result<Self> {
        let notary = Arc::new(Notary::new(
            NotaryConfig::from_env(),
            Arc::new(SigningKey::generate()),
        ));
        notary.start().await;

        let transport = Arc::new(InMemoryNetwork::new());
        let map = Arc::new(NetworkMap::new(notary.identity().clone()));

        let mut nodes = BTreeMap::new();
        for spec in parties {
            let config = PartyConfig {
                name: spec.name.clone(),
                max_accepted_value: spec.max_accepted_value,
                ..template.clone()
            };

            let node = PartyNode::builder()
                .config(config)
                .signing_key(Arc::new(SigningKey::generate()))
                .identity(map.clone())
                .transport(transport.clone())
                .notary(notary.clone())
                .build()?;
            map.register(node.party().clone(), format!("memory://{}", spec.name));
            node.start()?;

            info!(
                party = %node.name(),
                key_id = %node.party().key.key_id(),
                max_accepted_value = ?spec.max_accepted_value,
                "Simulated party online"
            );
            nodes.insert(node.name().clone(), Arc::new(node));
        }

        Ok(Self {
            transport,
            map,
            notary,
            nodes,
        })
    }

    pub fn node(&self, name: &str) -> anyhow::Result<Arc<PartyNode>> {
        self.nodes
            .get(&PartyName::new(name))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown simulated party: {}", name))
    }

    pub fn names(&self) -> Vec<PartyName> {
        self.nodes.keys().cloned().collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PartyNode>> {
        self.nodes.values()
    }

    /// Stop every node.
    pub fn shutdown(&self) {
        for node in self.nodes.values() {
            node.stop();
        }
    }
}
