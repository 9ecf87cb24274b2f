//! Responding side of an issuance.
//!
//! The acceptor never trusts the initiator's checks: it runs the contract
//! again, confirms it is the named recipient and a required signer, that
//! the session was opened by the record's sender and that the sender's
//! signature verifies. Only then does it consult its acceptance policy.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use accord_common::{
    contract, AccordError, FinalizedTransaction, FlowId, NotaryError, PartyName, Result,
    SessionError, SignedTransaction, Violation, ViolationList,
};
use accord_protocol::{IncomingSession, Message, Session};

use super::{FlowContext, FlowState, ProgressTracker};

/// Acceptor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcceptorState {
    AwaitingProposal,
    Verifying,
    SigningOrRejecting,
    AwaitingFinality,
    Done,
    Failed,
}

impl FlowState for AcceptorState {
    fn valid_transitions(&self) -> &'static [Self] {
        use AcceptorState::*;
        match self {
            // A resumed initiator may skip straight to the finalized notice.
            AwaitingProposal => &[Verifying, AwaitingFinality, Failed],
            Verifying => &[SigningOrRejecting, Failed],
            SigningOrRejecting => &[AwaitingFinality, Failed],
            AwaitingFinality => &[Done, Failed],
            Done | Failed => &[],
        }
    }

    fn name(&self) -> &'static str {
        match self {
            AcceptorState::AwaitingProposal => "AWAITING_PROPOSAL",
            AcceptorState::Verifying => "VERIFYING",
            AcceptorState::SigningOrRejecting => "SIGNING_OR_REJECTING",
            AcceptorState::AwaitingFinality => "AWAITING_FINALITY",
            AcceptorState::Done => "DONE",
            AcceptorState::Failed => "FAILED",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AcceptorState::AwaitingProposal => "Waiting for a proposed transaction.",
            AcceptorState::Verifying => "Verifying and signing the proposed transaction.",
            AcceptorState::SigningOrRejecting => "Answering the proposal.",
            AcceptorState::AwaitingFinality => "Waiting for the notarized transaction.",
            AcceptorState::Done => "Transaction recorded.",
            AcceptorState::Failed => "Negotiation failed.",
        }
    }
}

/// One incoming negotiation, run by the proposed recipient.
pub struct Acceptor {
    ctx: Arc<FlowContext>,
    flow_id: FlowId,
    progress: ProgressTracker<AcceptorState>,
}

impl Acceptor {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        let flow_id = FlowId::new();
        Self {
            ctx,
            flow_id,
            progress: ProgressTracker::new(flow_id, "acceptor", AcceptorState::AwaitingProposal),
        }
    }

    pub fn flow_id(&self) -> FlowId {
        self.flow_id
    }

    pub fn state(&self) -> AcceptorState {
        self.progress.current()
    }

    pub fn progress(&self) -> watch::Receiver<AcceptorState> {
        self.progress.subscribe()
    }

    pub fn history(&self) -> Vec<AcceptorState> {
        self.progress.history()
    }

    /// Answer one incoming session.
    ///
    /// Returns the recorded transaction. A refused proposal is returned as
    /// [`AccordError::Violation`] after the rejection has been sent.
    #[instrument(
        skip(self, incoming),
        fields(flow_id = %self.flow_id, party = %self.ctx.me.name, initiator = %incoming.initiator)
    )]
    pub async fn run(&self, incoming: IncomingSession) -> Result<FinalizedTransaction> {
        let IncomingSession {
            initiator,
            mut session,
            ..
        } = incoming;

        let result = self.respond(&initiator, session.as_mut()).await;
        session.close().await;

        match &result {
            Ok(finalized) => info!(
                tx_id = %finalized.id(),
                sequence = finalized.sequence,
                "Obligation recorded"
            ),
            Err(e) => {
                warn!(
                    error = %e,
                    code = e.error_code(),
                    state = self.state().name(),
                    "Negotiation ended without recording"
                );
                if !self.state().is_final() {
                    self.progress.transition_to(AcceptorState::Failed)?;
                }
            }
        }

        result
    }

    async fn respond(
        &self,
        initiator: &PartyName,
        session: &mut dyn Session,
    ) -> Result<FinalizedTransaction> {
        let first = receive(session, self.ctx.config.response_timeout, "PROPOSAL").await?;

        match first {
            Message::Proposal(proposal) => self.negotiate(initiator, session, proposal).await,
            Message::Finalized(finalized) => {
                self.progress.transition_to(AcceptorState::AwaitingFinality)?;
                if !finalized.signed.signatures.contains(&self.ctx.me.key) {
                    return Err(AccordError::MissingSignatures {
                        missing: vec![self.ctx.me.key],
                    });
                }
                self.record(session, finalized).await
            }
            Message::Abort { reason } => Err(SessionError::Aborted(reason).into()),
            other => Err(other.unexpected("PROPOSAL").into()),
        }
    }

    async fn negotiate(
        &self,
        initiator: &PartyName,
        session: &mut dyn Session,
        proposal: SignedTransaction,
    ) -> Result<FinalizedTransaction> {
        let id = proposal.id();
        debug!(tx_id = %id.short(), "Proposal received");

        self.progress.transition_to(AcceptorState::Verifying)?;
        let violations = self.review(initiator, &proposal).await;

        self.progress
            .transition_to(AcceptorState::SigningOrRejecting)?;
        if !violations.is_empty() {
            info!(tx_id = %id.short(), violations = %violations, "Rejecting proposal");
            session
                .send(Message::Rejection {
                    violations: violations.clone(),
                })
                .await?;
            return Err(AccordError::Violation(violations));
        }

        let signature = self.ctx.key.sign(id.as_bytes());
        session.send(Message::Signature(signature)).await?;
        debug!(tx_id = %id.short(), "Signature sent");

        self.progress.transition_to(AcceptorState::AwaitingFinality)?;
        let finalized = match receive(
            session,
            self.ctx.config.finality_wait_timeout,
            "FINALIZED",
        )
        .await?
        {
            Message::Finalized(finalized) => finalized,
            Message::Abort { reason } => return Err(SessionError::Aborted(reason).into()),
            other => return Err(other.unexpected("FINALIZED").into()),
        };

        if finalized.id() != id {
            return Err(AccordError::InvalidSignature(format!(
                "finalized transaction {} is not the one signed ({})",
                finalized.id().short(),
                id.short()
            )));
        }

        self.record(session, finalized).await
    }

    /// Re-check everything the initiator claims. Every failure is reported.
    async fn review(&self, initiator: &PartyName, proposal: &SignedTransaction) -> ViolationList {
        let me = &self.ctx.me;
        let tx = &proposal.tx;
        let id = proposal.id();

        let mut violations = match contract::verify(tx) {
            Ok(()) => ViolationList::new(),
            Err(violations) => violations,
        };

        if !tx.required_signers().contains(&me.key) {
            violations.push(Violation::NotASigner {
                party: me.name.clone(),
            });
        }

        if let Some(record) = tx.single_output() {
            if record.recipient() != me {
                violations.push(Violation::RecipientMismatch {
                    reviewer: me.name.clone(),
                    named: record.recipient().name.clone(),
                });
            }

            let sender = record.sender();
            let proposer_is_sender = match self.ctx.identity.resolve(initiator).await {
                Ok(resolved) => resolved.party == *sender,
                Err(_) => false,
            };
            if !proposer_is_sender {
                violations.push(Violation::ProposerMismatch {
                    proposer: initiator.clone(),
                    sender: sender.name.clone(),
                });
            }
        }

        for (key, signature) in proposal.signatures.iter() {
            if key.verify(id.as_bytes(), signature).is_err() {
                violations.push(Violation::UnverifiedSignature { key: *key });
            }
        }
        for key in proposal.missing_signers() {
            if key != me.key {
                violations.push(Violation::UnverifiedSignature { key });
            }
        }

        let notary = self.ctx.identity.notary();
        if tx.notary() != &notary {
            violations.push(Violation::Policy {
                reason: format!("{} is not a trusted notary", tx.notary().name),
            });
        }

        if violations.is_empty() {
            if let Err(violation) = self.ctx.policy.check(tx).await {
                violations.push(violation);
            }
        }

        violations
    }

    async fn record(
        &self,
        session: &mut dyn Session,
        finalized: FinalizedTransaction,
    ) -> Result<FinalizedTransaction> {
        let notary = self.ctx.identity.notary();
        if finalized.tx().notary() != &notary {
            return Err(NotaryError::WrongNotary {
                requested: finalized.tx().notary().name.clone(),
                actual: notary.name,
            }
            .into());
        }
        finalized.verify_notarization()?;
        contract::verify(finalized.tx())?;

        self.ctx.vault.store(finalized.clone()).await?;

        if let Err(e) = session
            .send(Message::FinalityAck {
                tx_id: finalized.id(),
            })
            .await
        {
            warn!(error = %e, "Finality ack not delivered");
        }

        self.progress.transition_to(AcceptorState::Done)?;
        Ok(finalized)
    }
}

async fn receive(session: &mut dyn Session, wait: Duration, expected: &str) -> Result<Message> {
    match tokio::time::timeout(wait, session.receive()).await {
        Ok(message) => Ok(message?),
        Err(_) => Err(SessionError::Timeout(expected.to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalized_notice_may_skip_review() {
        assert!(AcceptorState::AwaitingProposal.can_transition_to(AcceptorState::AwaitingFinality));
        assert!(!AcceptorState::Verifying.can_transition_to(AcceptorState::AwaitingFinality));
        assert!(!AcceptorState::AwaitingProposal.can_transition_to(AcceptorState::Done));
    }

    #[test]
    fn test_final_states() {
        assert!(AcceptorState::Done.is_final());
        assert!(AcceptorState::Failed.is_final());
        assert!(!AcceptorState::AwaitingFinality.is_final());
        assert_eq!(AcceptorState::SigningOrRejecting.name(), "SIGNING_OR_REJECTING");
    }
}
