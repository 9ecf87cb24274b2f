//! Gathers the counterparty's signature over one session.

use std::time::Duration;

use tracing::{debug, info, warn};

use accord_common::{
    AccordError, Party, Result, SessionError, SignedTransaction, Violation, ViolationList,
};
use accord_protocol::{Message, Session};

/// Initiator side of the signature exchange.
pub struct SignatureCollector<'a> {
    session: &'a mut dyn Session,
    counterparty: &'a Party,
    timeout: Duration,
}

impl<'a> SignatureCollector<'a> {
    pub fn new(session: &'a mut dyn Session, counterparty: &'a Party, timeout: Duration) -> Self {
        Self {
            session,
            counterparty,
            timeout,
        }
    }

    /// Send the proposal and wait for a signature or a rejection.
    ///
    /// On success the returned transaction carries the counterparty's
    /// verified signature and is fully signed. A missing answer within the
    /// timeout is reported as a rejection.
    pub async fn collect(self, proposal: SignedTransaction) -> Result<SignedTransaction> {
        let id = proposal.id();
        self.session.send(Message::Proposal(proposal.clone())).await?;
        debug!(tx_id = %id.short(), counterparty = %self.counterparty.name, "Proposal sent");

        let reply = match tokio::time::timeout(self.timeout, self.session.receive()).await {
            Ok(reply) => reply?,
            Err(_) => {
                let waited_ms = self.timeout.as_millis() as u64;
                warn!(tx_id = %id.short(), waited_ms, "No answer from counterparty");
                return Err(AccordError::Rejected {
                    party: self.counterparty.name.clone(),
                    violations: Violation::NoResponse { waited_ms }.into(),
                });
            }
        };

        match reply {
            Message::Signature(signature) => {
                if signature.key != self.counterparty.key {
                    return Err(AccordError::InvalidSignature(format!(
                        "expected signature from {}, got key {}",
                        self.counterparty.name,
                        signature.key.key_id()
                    )));
                }
                self.counterparty.key.verify(id.as_bytes(), &signature)?;

                let signed = proposal.with_signature(signature);
                signed.verify_signatures()?;

                info!(
                    tx_id = %id.short(),
                    counterparty = %self.counterparty.name,
                    "Counterparty signed"
                );
                Ok(signed)
            }
            Message::Rejection { violations } => Err(rejected(self.counterparty, violations)),
            Message::Abort { reason } => Err(SessionError::Aborted(reason).into()),
            other => Err(other.unexpected("SIGNATURE or REJECTION").into()),
        }
    }
}

fn rejected(counterparty: &Party, violations: ViolationList) -> AccordError {
    info!(
        counterparty = %counterparty.name,
        violations = %violations,
        "Proposal rejected"
    );
    AccordError::Rejected {
        party: counterparty.name.clone(),
        violations,
    }
}
