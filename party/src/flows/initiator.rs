//! Proposing side of an issuance.
//!
//! `Building -> LocalVerifying -> LocalSigning -> CollectingSignature ->
//! Notarizing -> Done`, with `Failed` reachable from every non-final state.
//! A checkpoint is saved on entering each network-bound state so an
//! interrupted flow can be resumed without signing again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use accord_common::{
    contract, AccordError, FinalizedTransaction, FlowId, Party, PartyName, Result,
    SignedTransaction,
};
use accord_protocol::{FlowType, Message, Session};
use accord_vault::Checkpoint;

use super::{FlowContext, FlowState, ProgressTracker};
use crate::assembler;
use crate::collector::SignatureCollector;

/// Initiator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InitiatorState {
    Building,
    LocalVerifying,
    LocalSigning,
    CollectingSignature,
    Notarizing,
    Done,
    Failed,
}

impl FlowState for InitiatorState {
    fn valid_transitions(&self) -> &'static [Self] {
        use InitiatorState::*;
        match self {
            Building => &[LocalVerifying, Failed],
            LocalVerifying => &[LocalSigning, Failed],
            LocalSigning => &[CollectingSignature, Failed],
            CollectingSignature => &[Notarizing, Failed],
            Notarizing => &[Done, Failed],
            Done | Failed => &[],
        }
    }

    fn name(&self) -> &'static str {
        match self {
            InitiatorState::Building => "BUILDING",
            InitiatorState::LocalVerifying => "LOCAL_VERIFYING",
            InitiatorState::LocalSigning => "LOCAL_SIGNING",
            InitiatorState::CollectingSignature => "COLLECTING_SIGNATURE",
            InitiatorState::Notarizing => "NOTARIZING",
            InitiatorState::Done => "DONE",
            InitiatorState::Failed => "FAILED",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            InitiatorState::Building => "Generating transaction based on new IOU.",
            InitiatorState::LocalVerifying => "Verifying contract constraints.",
            InitiatorState::LocalSigning => "Signing transaction with our private key.",
            InitiatorState::CollectingSignature => "Obtaining the counterparty's signature.",
            InitiatorState::Notarizing => "Obtaining notary signature and recording transaction.",
            InitiatorState::Done => "Transaction finalized.",
            InitiatorState::Failed => "Issuance failed.",
        }
    }
}

impl InitiatorState {
    /// Parse a checkpointed state name.
    pub fn from_name(name: &str) -> Option<Self> {
        use InitiatorState::*;
        [
            Building,
            LocalVerifying,
            LocalSigning,
            CollectingSignature,
            Notarizing,
            Done,
            Failed,
        ]
        .into_iter()
        .find(|state| state.name() == name)
    }

    /// States a checkpoint may be resumed from.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            InitiatorState::CollectingSignature | InitiatorState::Notarizing
        )
    }
}

/// One issuance, run by the proposing party.
pub struct Initiator {
    ctx: Arc<FlowContext>,
    flow_id: FlowId,
    progress: ProgressTracker<InitiatorState>,
}

impl Initiator {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        let flow_id = FlowId::new();
        Self {
            ctx,
            flow_id,
            progress: ProgressTracker::new(flow_id, "initiator", InitiatorState::Building),
        }
    }

    /// Rebuild an interrupted flow from its checkpoint.
    pub fn from_checkpoint(ctx: Arc<FlowContext>, checkpoint: &Checkpoint) -> Result<Self> {
        let state = InitiatorState::from_name(&checkpoint.state)
            .filter(InitiatorState::is_resumable)
            .ok_or_else(|| {
                AccordError::Storage(format!(
                    "flow {} cannot resume from state {}",
                    checkpoint.flow_id, checkpoint.state
                ))
            })?;

        Ok(Self {
            ctx,
            flow_id: checkpoint.flow_id,
            progress: ProgressTracker::new(checkpoint.flow_id, "initiator", state),
        })
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn state(&self) -> InitiatorState {
        self.progress.current()
    }

    /// Follow state changes.
    pub fn progress(&self) -> watch::Receiver<InitiatorState> {
        self.progress.subscribe()
    }

    /// Every state entered so far.
    pub fn history(&self) -> Vec<InitiatorState> {
        self.progress.history()
    }

    /// Issue an obligation of `value` to `recipient`.
    #[instrument(skip(self), fields(flow_id = %self.flow_id, party = %self.ctx.me.name))]
    pub async fn run(&self, value: i64, recipient: &PartyName) -> Result<FinalizedTransaction> {
        let result = self.issue(value, recipient).await;
        self.finish(result).await
    }

    /// Continue from `checkpoint`, which must be the one this flow was
    /// rebuilt from.
    #[instrument(
        skip(self, checkpoint),
        fields(flow_id = %self.flow_id, party = %self.ctx.me.name)
    )]
    pub async fn resume(&self, checkpoint: Checkpoint) -> Result<FinalizedTransaction> {
        info!(state = %checkpoint.state, "Resuming from checkpoint");
        let result = self.continue_from(checkpoint).await;
        self.finish(result).await
    }

    async fn issue(&self, value: i64, recipient: &PartyName) -> Result<FinalizedTransaction> {
        let counterparty = self.ctx.identity.resolve(recipient).await?.party;
        let notary = self.ctx.identity.notary();
        let tx = assembler::build(value, &self.ctx.me, &counterparty, &notary);
        debug!(tx_id = %tx.id().short(), value, recipient = %recipient, "Transaction built");

        self.progress.transition_to(InitiatorState::LocalVerifying)?;
        contract::verify(&tx)?;

        self.progress.transition_to(InitiatorState::LocalSigning)?;
        let signature = self.ctx.key.sign(tx.id().as_bytes());
        let proposal = SignedTransaction::new(tx).with_signature(signature);

        self.progress
            .transition_to(InitiatorState::CollectingSignature)?;
        self.collect_and_finalize(proposal, counterparty).await
    }

    async fn continue_from(&self, checkpoint: Checkpoint) -> Result<FinalizedTransaction> {
        let counterparty = self
            .ctx
            .identity
            .resolve(&checkpoint.counterparty)
            .await?
            .party;
        let tx = checkpoint.tx;

        if !tx.signatures.contains(&self.ctx.me.key) {
            return Err(AccordError::MissingSignatures {
                missing: vec![self.ctx.me.key],
            });
        }
        tx.verify_signatures_except(&[counterparty.key])?;

        match self.progress.current() {
            InitiatorState::CollectingSignature => {
                self.collect_and_finalize(tx, counterparty).await
            }
            InitiatorState::Notarizing => self.notarize_and_record(tx, &counterparty, None).await,
            other => Err(AccordError::InvalidTransition {
                from: other.name().to_string(),
                to: InitiatorState::Notarizing.name().to_string(),
            }),
        }
    }

    async fn collect_and_finalize(
        &self,
        proposal: SignedTransaction,
        counterparty: Party,
    ) -> Result<FinalizedTransaction> {
        self.checkpoint(InitiatorState::CollectingSignature, &counterparty, &proposal)
            .await?;

        let mut session = self
            .ctx
            .transport
            .open(&self.ctx.me.name, &counterparty.name, FlowType::IssueObligation)
            .await?;

        let collector = SignatureCollector::new(
            session.as_mut(),
            &counterparty,
            self.ctx.config.response_timeout,
        );
        let signed = match collector.collect(proposal).await {
            Ok(signed) => signed,
            Err(e) => {
                if !matches!(e, AccordError::Rejected { .. }) {
                    abort(session, &e).await;
                }
                return Err(e);
            }
        };

        self.progress.transition_to(InitiatorState::Notarizing)?;
        self.notarize_and_record(signed, &counterparty, Some(session))
            .await
    }

    async fn notarize_and_record(
        &self,
        signed: SignedTransaction,
        counterparty: &Party,
        session: Option<Box<dyn Session>>,
    ) -> Result<FinalizedTransaction> {
        self.checkpoint(InitiatorState::Notarizing, counterparty, &signed)
            .await?;

        let finalized = match self.ctx.notary.notarize(signed).await {
            Ok(finalized) => finalized,
            Err(e) => {
                let e = AccordError::from(e);
                if let Some(session) = session {
                    abort(session, &e).await;
                }
                return Err(e);
            }
        };

        self.ctx.vault.store(finalized.clone()).await?;
        self.share_finality(&finalized, counterparty, session).await;

        self.progress.transition_to(InitiatorState::Done)?;
        Ok(finalized)
    }

    /// Tell the counterparty about the finalized transaction. Notarization
    /// is irreversible, so failures here are logged rather than returned.
    async fn share_finality(
        &self,
        finalized: &FinalizedTransaction,
        counterparty: &Party,
        session: Option<Box<dyn Session>>,
    ) {
        let mut session = match session {
            Some(session) => session,
            None => match self
                .ctx
                .transport
                .open(&self.ctx.me.name, &counterparty.name, FlowType::IssueObligation)
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        error = %e,
                        counterparty = %counterparty.name,
                        "Could not reach counterparty with finalized transaction"
                    );
                    return;
                }
            },
        };

        if let Err(e) = session.send(Message::Finalized(finalized.clone())).await {
            warn!(error = %e, "Could not send finalized transaction");
            return;
        }

        let wait = self.ctx.config.finality_ack_timeout;
        match tokio::time::timeout(wait, session.receive()).await {
            Ok(Ok(Message::FinalityAck { tx_id })) if tx_id == finalized.id() => {
                debug!(counterparty = %counterparty.name, "Finality acknowledged");
            }
            Ok(Ok(other)) => {
                warn!(message = %other.message_type(), "Unexpected reply to finalized transaction");
            }
            Ok(Err(e)) => warn!(error = %e, "Session failed while waiting for finality ack"),
            Err(_) => warn!(
                waited_ms = wait.as_millis() as u64,
                "No finality ack from counterparty"
            ),
        }

        session.close().await;
    }

    async fn checkpoint(
        &self,
        state: InitiatorState,
        counterparty: &Party,
        tx: &SignedTransaction,
    ) -> Result<()> {
        let checkpoint = Checkpoint::new(
            self.flow_id,
            state.name(),
            counterparty.name.clone(),
            tx.clone(),
        );
        self.ctx.checkpoints.save(&checkpoint).await
    }

    async fn finish(&self, result: Result<FinalizedTransaction>) -> Result<FinalizedTransaction> {
        if let Err(e) = self.ctx.checkpoints.remove(&self.flow_id).await {
            warn!(error = %e, "Could not remove checkpoint");
        }

        match &result {
            Ok(finalized) => info!(
                tx_id = %finalized.id(),
                sequence = finalized.sequence,
                "Issuance finalized"
            ),
            Err(e) => {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    state = self.state().name(),
                    "Issuance failed"
                );
                if !self.state().is_final() {
                    self.progress.transition_to(InitiatorState::Failed)?;
                }
            }
        }

        result
    }
}

async fn abort(mut session: Box<dyn Session>, error: &AccordError) {
    let reason = error.to_string();
    if let Err(e) = session.send(Message::Abort { reason }).await {
        debug!(error = %e, "Abort not delivered");
    }
    session.close().await;
}
