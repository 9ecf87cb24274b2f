//! A party on the network: accepts incoming negotiations and starts new
//! issuances.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use accord_common::{AccordError, FinalizedTransaction, Party, PartyName, Result};
use accord_crypto::SigningKey;
use accord_protocol::{FlowType, IdentityService, NotaryService, SessionTransport};
use accord_vault::{CheckpointStore, InMemoryCheckpoints, InMemoryVault, TransactionStore};

use crate::config::PartyConfig;
use crate::flows::{Acceptor, FlowContext, Initiator};
use crate::notary_client::NotaryClient;
use crate::policy::{AcceptAll, AcceptancePolicy, MaxValuePolicy};

/// Node state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Not accepting sessions.
    Stopped,
    /// Registered with the transport and accepting sessions.
    Running,
}

/// A running party.
pub struct PartyNode {
    ctx: Arc<FlowContext>,
    state: Mutex<NodeState>,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
}

impl PartyNode {
    pub fn builder() -> PartyNodeBuilder {
        PartyNodeBuilder::new()
    }

    pub fn party(&self) -> &Party {
        &self.ctx.me
    }

    pub fn name(&self) -> &PartyName {
        &self.ctx.me.name
    }

    pub fn config(&self) -> &PartyConfig {
        &self.ctx.config
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// This party's vault.
    pub fn vault(&self) -> Arc<dyn TransactionStore> {
        self.ctx.vault.clone()
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.ctx.checkpoints.clone()
    }

    /// Start accepting issuance proposals.
    #[instrument(skip(self), fields(party = %self.ctx.me.name))]
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == NodeState::Running {
            return Err(AccordError::InvalidTransition {
                from: "RUNNING".to_string(),
                to: "RUNNING".to_string(),
            });
        }

        let mut incoming = self
            .ctx
            .transport
            .register(&self.ctx.me.name, FlowType::IssueObligation);
        let ctx = self.ctx.clone();

        let handle = tokio::spawn(async move {
            while let Some(session) = incoming.recv().await {
                let acceptor = Acceptor::new(ctx.clone());
                tokio::spawn(async move {
                    if let Err(e) = acceptor.run(session).await {
                        debug!(error = %e, "Acceptor finished with error");
                    }
                });
            }
            debug!("Accept loop ended");
        });

        *self.accept_loop.lock() = Some(handle);
        *state = NodeState::Running;

        info!(key_id = %self.ctx.me.key.key_id(), "Party node started");
        Ok(())
    }

    /// Stop accepting proposals. Negotiations already running finish on
    /// their own.
    #[instrument(skip(self), fields(party = %self.ctx.me.name))]
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == NodeState::Stopped {
            return;
        }

        self.ctx
            .transport
            .deregister(&self.ctx.me.name, FlowType::IssueObligation);
        if let Some(handle) = self.accept_loop.lock().take() {
            handle.abort();
        }
        *state = NodeState::Stopped;

        info!("Party node stopped");
    }

    /// A fresh initiator, for callers that want to follow its progress.
    pub fn initiator(&self) -> Initiator {
        Initiator::new(self.ctx.clone())
    }

    /// Issue an obligation of `value` owed by this party to `recipient`.
    pub async fn issue(
        &self,
        value: i64,
        recipient: impl Into<PartyName>,
    ) -> Result<FinalizedTransaction> {
        let recipient = recipient.into();
        self.initiator().run(value, &recipient).await
    }

    /// Resume every initiator interrupted after signing.
    ///
    /// Returns one outcome per checkpoint, in no particular order.
    pub async fn resume_pending(&self) -> Result<Vec<Result<FinalizedTransaction>>> {
        let pending = self.ctx.checkpoints.pending().await?;
        if !pending.is_empty() {
            info!(count = pending.len(), party = %self.ctx.me.name, "Resuming interrupted flows");
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for checkpoint in pending {
            let outcome = match Initiator::from_checkpoint(self.ctx.clone(), &checkpoint) {
                Ok(initiator) => initiator.resume(checkpoint).await,
                Err(e) => {
                    warn!(flow_id = %checkpoint.flow_id, error = %e, "Discarding checkpoint");
                    self.ctx.checkpoints.remove(&checkpoint.flow_id).await?;
                    Err(e)
                }
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }
}

impl Drop for PartyNode {
    fn drop(&mut self) {
        if let Some(handle) = self.accept_loop.lock().take() {
            handle.abort();
        }
    }
}

/// Builder for [`PartyNode`].
pub struct PartyNodeBuilder {
    config: PartyConfig,
    key: Option<Arc<SigningKey>>,
    identity: Option<Arc<dyn IdentityService>>,
    transport: Option<Arc<dyn SessionTransport>>,
    notary: Option<Arc<dyn NotaryService>>,
    vault: Option<Arc<dyn TransactionStore>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    policy: Option<Arc<dyn AcceptancePolicy>>,
}

impl PartyNodeBuilder {
    pub fn new() -> Self {
        Self {
            config: PartyConfig::default(),
            key: None,
            identity: None,
            transport: None,
            notary: None,
            vault: None,
            checkpoints: None,
            policy: None,
        }
    }

    pub fn config(mut self, config: PartyConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the party name, keeping the rest of the configuration.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn signing_key(mut self, key: Arc<SigningKey>) -> Self {
        self.key = Some(key);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentityService>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn SessionTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn notary(mut self, notary: Arc<dyn NotaryService>) -> Self {
        self.notary = Some(notary);
        self
    }

    /// Defaults to an in-memory vault owned by this party.
    pub fn vault(mut self, vault: Arc<dyn TransactionStore>) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn checkpoints(mut self, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    /// Defaults to [`MaxValuePolicy`] when the configuration sets a limit,
    /// otherwise [`AcceptAll`].
    pub fn policy(mut self, policy: Arc<dyn AcceptancePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the node. It does not accept sessions until started.
    pub fn build(self) -> Result<PartyNode> {
        self.config.validate().map_err(AccordError::Configuration)?;

        let key = self
            .key
            .ok_or_else(|| AccordError::Configuration("Signing key is required".to_string()))?;
        let identity = self.identity.ok_or_else(|| {
            AccordError::Configuration("Identity service is required".to_string())
        })?;
        let transport = self
            .transport
            .ok_or_else(|| AccordError::Configuration("Transport is required".to_string()))?;
        let notary = self
            .notary
            .ok_or_else(|| AccordError::Configuration("Notary is required".to_string()))?;

        let me = Party::new(self.config.name.as_str(), key.public_key());
        let vault = self
            .vault
            .unwrap_or_else(|| Arc::new(InMemoryVault::new(me.clone())));
        let checkpoints = self
            .checkpoints
            .unwrap_or_else(|| Arc::new(InMemoryCheckpoints::new()));
        let policy: Arc<dyn AcceptancePolicy> = match self.policy {
            Some(policy) => policy,
            None => match self.config.max_accepted_value {
                Some(max) => Arc::new(MaxValuePolicy::new(max)),
                None => Arc::new(AcceptAll),
            },
        };

        let ctx = FlowContext {
            me,
            key,
            notary: NotaryClient::new(notary, self.config.notary_timeout),
            config: self.config,
            identity,
            transport,
            vault,
            checkpoints,
            policy,
        };

        Ok(PartyNode {
            ctx: Arc::new(ctx),
            state: Mutex::new(NodeState::Stopped),
            accept_loop: Mutex::new(None),
        })
    }
}

impl Default for PartyNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_protocol::{InMemoryNetwork, NetworkMap};

    #[test]
    fn test_builder_requires_key() {
        let notary_key = Arc::new(SigningKey::generate());
        let notary = Arc::new(accord_notary::Notary::new(
            accord_notary::NotaryConfig::default(),
            notary_key,
        ));
        let map = Arc::new(NetworkMap::new(notary.identity().clone()));

        let result = PartyNode::builder()
            .name("PARTY_A")
            .identity(map)
            .transport(Arc::new(InMemoryNetwork::new()))
            .notary(notary)
            .build();

        match result {
            Err(e) => assert_eq!(e.error_code(), "CONFIGURATION_ERROR"),
            Ok(_) => panic!("node built without a signing key"),
        }
    }

    #[test]
    fn test_builder_rejects_invalid_name() {
        let result = PartyNode::builder()
            .name("")
            .signing_key(Arc::new(SigningKey::generate()))
            .build();

        assert!(matches!(result, Err(AccordError::Configuration(_))));
    }
}
