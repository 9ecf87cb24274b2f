//! The two sides of an issuance negotiation.
//!
//! Each side is an explicit state machine. Every transition is checked
//! against the state's table of successors, logged, and published on a
//! watch channel so callers can follow progress.

pub mod acceptor;
pub mod initiator;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use accord_common::{AccordError, FlowId, Party, Result};
use accord_crypto::SigningKey;
use accord_protocol::{IdentityService, SessionTransport};
use accord_vault::{CheckpointStore, TransactionStore};

use crate::config::PartyConfig;
use crate::notary_client::NotaryClient;
use crate::policy::AcceptancePolicy;

pub use acceptor::{Acceptor, AcceptorState};
pub use initiator::{Initiator, InitiatorState};

/// A state of a negotiation state machine.
pub trait FlowState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// States reachable from this one.
    fn valid_transitions(&self) -> &'static [Self];

    /// Stable name, used in checkpoints.
    fn name(&self) -> &'static str;

    /// Human-readable progress label.
    fn label(&self) -> &'static str;

    fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }

    fn is_final(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Current state of one flow plus the states it went through.
pub struct ProgressTracker<S: FlowState> {
    flow_id: FlowId,
    role: &'static str,
    tx: watch::Sender<S>,
    history: Mutex<Vec<S>>,
}

impl<S: FlowState> ProgressTracker<S> {
    pub fn new(flow_id: FlowId, role: &'static str, initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            flow_id,
            role,
            tx,
            history: Mutex::new(vec![initial]),
        }
    }

    pub fn current(&self) -> S {
        *self.tx.borrow()
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> Vec<S> {
        self.history.lock().clone()
    }

    /// Move to `next`, refusing transitions the table does not allow.
    pub fn transition_to(&self, next: S) -> Result<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(AccordError::InvalidTransition {
                from: current.name().to_string(),
                to: next.name().to_string(),
            });
        }

        info!(
            flow_id = %self.flow_id,
            role = self.role,
            from = current.name(),
            to = next.name(),
            "{}",
            next.label()
        );

        self.history.lock().push(next);
        self.tx.send_replace(next);
        Ok(())
    }
}

/// Everything a flow needs from the party running it.
pub struct FlowContext {
    /// The party running the flow.
    pub me: Party,
    pub key: Arc<SigningKey>,
    pub config: PartyConfig,
    pub identity: Arc<dyn IdentityService>,
    pub transport: Arc<dyn SessionTransport>,
    pub notary: NotaryClient,
    pub vault: Arc<dyn TransactionStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub policy: Arc<dyn AcceptancePolicy>,
}
