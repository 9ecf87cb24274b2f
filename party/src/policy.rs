//! Local acceptance rules applied by a counterparty before it signs.
//!
//! The contract decides whether a transaction is valid at all; a policy
//! decides whether this particular party is willing to be bound by it.

use async_trait::async_trait;
use tracing::info;

use accord_common::{Transaction, Violation};

/// Decides whether to sign a contract-valid proposal.
#[async_trait]
pub trait AcceptancePolicy: Send + Sync {
    /// `Err` carries the reason for refusing.
    async fn check(&self, tx: &Transaction) -> Result<(), Violation>;
}

/// Accepts everything the contract accepts.
pub struct AcceptAll;

#[async_trait]
impl AcceptancePolicy for AcceptAll {
    async fn check(&self, tx: &Transaction) -> Result<(), Violation> {
        if let Some(record) = tx.single_output() {
            info!(
                tx_id = %tx.id().short(),
                value = record.value(),
                sender = %record.sender().name,
                "Accepting proposal"
            );
        }
        Ok(())
    }
}

/// Refuses obligations above a limit.
pub struct MaxValuePolicy {
    max: i64,
}

impl MaxValuePolicy {
    pub fn new(max: i64) -> Self {
        Self { max }
    }
}

#[async_trait]
impl AcceptancePolicy for MaxValuePolicy {
    async fn check(&self, tx: &Transaction) -> Result<(), Violation> {
        match tx.outputs().iter().find(|r| r.value() > self.max) {
            Some(record) => Err(Violation::Policy {
                reason: format!("value {} exceeds limit {}", record.value(), self.max),
            }),
            None => Ok(()),
        }
    }
}

type Check = Box<dyn Fn(&Transaction) -> Result<(), String> + Send + Sync>;

/// Policy that forwards to a closure.
pub struct CallbackPolicy {
    check: Check,
}

impl CallbackPolicy {
    /// Create a policy from `check`; an `Err` string becomes the refusal reason.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(&Transaction) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            check: Box::new(check),
        }
    }
}

#[async_trait]
impl AcceptancePolicy for CallbackPolicy {
    async fn check(&self, tx: &Transaction) -> Result<(), Violation> {
        (self.check)(tx).map_err(|reason| Violation::Policy { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_common::Party;
    use accord_crypto::SigningKey;

    fn tx(value: i64) -> Transaction {
        let a = Party::new("PARTY_A", SigningKey::generate().public_key());
        let b = Party::new("PARTY_B", SigningKey::generate().public_key());
        let notary = Party::new("NOTARY", SigningKey::generate().public_key());
        crate::assembler::build(value, &a, &b, &notary)
    }

    #[tokio::test]
    async fn test_accept_all() {
        assert!(AcceptAll.check(&tx(1_000_000)).await.is_ok());
    }

    #[tokio::test]
    async fn test_max_value() {
        let policy = MaxValuePolicy::new(100);

        assert!(policy.check(&tx(100)).await.is_ok());
        let refusal = policy.check(&tx(101)).await.unwrap_err();
        assert_eq!(
            refusal.to_string(),
            "refused by local policy: value 101 exceeds limit 100"
        );
    }

    #[tokio::test]
    async fn test_callback() {
        let policy = CallbackPolicy::new(|tx| {
            if tx.outputs().iter().any(|r| r.sender().name.as_str() == "PARTY_A") {
                Err("we do not deal with PARTY_A".to_string())
            } else {
                Ok(())
            }
        });

        let refusal = policy.check(&tx(5)).await.unwrap_err();
        assert_eq!(refusal.code(), "POLICY");
    }
}
