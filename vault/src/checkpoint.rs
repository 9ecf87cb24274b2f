//! Flow checkpoints.
//!
//! An initiator records where it is at every network boundary so a
//! restarted party can resume instead of starting over. Checkpoints are
//! kept as JSON, the same bytes a durable store would write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use accord_common::{AccordError, FlowId, PartyName, Result, SignedTransaction};

/// Saved progress of one negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub flow_id: FlowId,
    /// Name of the state the flow will resume in.
    pub state: String,
    /// Counterparty of the negotiation.
    pub counterparty: PartyName,
    /// Transaction with every signature gathered so far.
    pub tx: SignedTransaction,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        flow_id: FlowId,
        state: impl Into<String>,
        counterparty: PartyName,
        tx: SignedTransaction,
    ) -> Self {
        Self {
            flow_id,
            state: state.into(),
            counterparty,
            tx,
            saved_at: Utc::now(),
        }
    }
}

/// Where checkpoints are kept.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Save, replacing any earlier checkpoint of the same flow.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    async fn load(&self, flow_id: &FlowId) -> Result<Option<Checkpoint>>;

    /// Drop the checkpoint of a finished flow.
    async fn remove(&self, flow_id: &FlowId) -> Result<()>;

    /// Every flow that has not finished.
    async fn pending(&self) -> Result<Vec<Checkpoint>>;
}

/// Checkpoints held in memory.
#[derive(Default)]
pub struct InMemoryCheckpoints {
    entries: DashMap<FlowId, Vec<u8>>,
}

impl InMemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode(bytes: &[u8]) -> Result<Checkpoint> {
        serde_json::from_slice(bytes).map_err(|e| AccordError::Storage(e.to_string()))
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpoints {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let bytes =
            serde_json::to_vec(checkpoint).map_err(|e| AccordError::Storage(e.to_string()))?;
        debug!(flow_id = %checkpoint.flow_id, state = %checkpoint.state, "Checkpoint saved");
        self.entries.insert(checkpoint.flow_id, bytes);
        Ok(())
    }

    async fn load(&self, flow_id: &FlowId) -> Result<Option<Checkpoint>> {
        match self.entries.get(flow_id) {
            Some(bytes) => Ok(Some(Self::decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, flow_id: &FlowId) -> Result<()> {
        self.entries.remove(flow_id);
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<Checkpoint>> {
        self.entries
            .iter()
            .map(|entry| Self::decode(entry.value()))
            .collect()
    }
}
