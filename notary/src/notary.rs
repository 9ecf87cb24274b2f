//! Core notary implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, instrument, warn};

use accord_common::{
    FinalizedTransaction, NotaryError, Party, SignedTransaction, StateRef, TransactionId,
};
use accord_crypto::SigningKey;
use accord_protocol::NotaryService;

use crate::config::NotaryConfig;
use crate::metrics::Metrics;
use crate::state::NotaryState;

/// The finality service.
///
/// Every transaction it signs gets a sequence number strictly greater than
/// the previous one. Inputs are consumed at most once.
pub struct Notary {
    config: NotaryConfig,
    identity: Party,
    key: Arc<SigningKey>,
    state: RwLock<NotaryState>,
    /// Input -> transaction that consumed it.
    consumed: DashMap<StateRef, TransactionId>,
    /// Everything finalized so far, for idempotent re-submission.
    finalized: DashMap<TransactionId, FinalizedTransaction>,
    /// Last sequence handed out. Held while consuming inputs and signing.
    sequence: Mutex<u64>,
    metrics: Metrics,
}

impl Notary {
    /// Create a notary signing with `key`.
    pub fn new(config: NotaryConfig, key: Arc<SigningKey>) -> Self {
        let identity = Party::new(config.name.as_str(), key.public_key());

        Self {
            config,
            identity,
            key,
            state: RwLock::new(NotaryState::Starting),
            consumed: DashMap::new(),
            finalized: DashMap::new(),
            sequence: Mutex::new(0),
            metrics: Metrics::new(),
        }
    }

    /// Start accepting requests.
    #[instrument(skip(self), fields(notary = %self.identity.name))]
    pub async fn start(&self) {
        *self.state.write() = NotaryState::Running;
        info!("Notary started");
    }

    /// Temporarily refuse requests.
    pub async fn pause(&self) {
        *self.state.write() = NotaryState::Paused;
        warn!(notary = %self.identity.name, "Notary paused");
    }

    /// Stop for good.
    pub async fn stop(&self) {
        *self.state.write() = NotaryState::Stopped;
        info!(notary = %self.identity.name, "Notary stopped");
    }

    pub fn state(&self) -> NotaryState {
        *self.state.read()
    }

    pub fn config(&self) -> &NotaryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// A transaction finalized earlier.
    pub fn lookup(&self, id: &TransactionId) -> Option<FinalizedTransaction> {
        self.finalized.get(id).map(|entry| entry.value().clone())
    }

    /// Number of distinct transactions finalized.
    pub fn finalized_count(&self) -> usize {
        self.finalized.len()
    }

    fn check(&self, tx: &SignedTransaction) -> Result<(), NotaryError> {
        let state = self.state();
        if !state.accepts_requests() {
            return Err(NotaryError::Unavailable(format!(
                "notary is {}",
                state.as_str()
            )));
        }

        let requested = tx.tx.notary();
        if requested != &self.identity {
            return Err(NotaryError::WrongNotary {
                requested: requested.name.clone(),
                actual: self.identity.name.clone(),
            });
        }

        tx.verify_signatures()
            .map_err(|e| NotaryError::InvalidSignatures(e.to_string()))
    }

    fn commit(&self, tx: SignedTransaction) -> Result<FinalizedTransaction, NotaryError> {
        let id = tx.id();
        let mut last = self.sequence.lock();

        // Re-check under the lock: a concurrent submission may have won.
        if let Some(existing) = self.finalized.get(&id) {
            return Ok(existing.value().clone());
        }

        let conflicts: Vec<String> = tx
            .tx
            .inputs()
            .iter()
            .filter(|input| {
                self.consumed
                    .get(*input)
                    .map(|by| *by.value() != id)
                    .unwrap_or(false)
            })
            .map(|input| input.to_string())
            .collect();
        if !conflicts.is_empty() {
            return Err(NotaryError::InputsConsumed { conflicts });
        }

        for input in tx.tx.inputs() {
            self.consumed.insert(*input, id);
        }

        *last += 1;
        let sequence = *last;
        let timestamp = Utc::now();
        let payload = FinalizedTransaction::notarization_payload(&id, sequence, &timestamp);

        let finalized = FinalizedTransaction {
            signed: tx,
            sequence,
            timestamp,
            notary_signature: self.key.sign(&payload),
        };
        self.finalized.insert(id, finalized.clone());

        Ok(finalized)
    }
}

#[async_trait]
impl NotaryService for Notary {
    fn identity(&self) -> &Party {
        &self.identity
    }

    #[instrument(skip(self, tx), fields(tx_id = %tx.id().short()))]
    async fn notarize(&self, tx: SignedTransaction) -> Result<FinalizedTransaction, NotaryError> {
        self.metrics.request_received();

        if !self.config.processing_delay.is_zero() {
            tokio::time::sleep(self.config.processing_delay).await;
        }

        if let Some(existing) = self.lookup(&tx.id()) {
            info!(sequence = existing.sequence, "Returning earlier finalization");
            self.metrics.request_duplicate();
            return Ok(existing);
        }

        let result = self.check(&tx).and_then(|_| self.commit(tx));

        match &result {
            Ok(finalized) => {
                info!(sequence = finalized.sequence, "Transaction notarized");
                self.metrics.request_notarized();
            }
            Err(e) => {
                warn!(error = %e, "Notarization refused");
                self.metrics.request_refused();
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_common::{Command, Record, TransactionBuilder};

    struct Fixture {
        notary: Arc<Notary>,
        a: SigningKey,
        b: SigningKey,
    }

    async fn fixture() -> Fixture {
        let notary = Arc::new(Notary::new(
            NotaryConfig::default(),
            Arc::new(SigningKey::generate()),
        ));
        notary.start().await;

        Fixture {
            notary,
            a: SigningKey::generate(),
            b: SigningKey::generate(),
        }
    }

    impl Fixture {
        fn builder(&self, value: i64) -> TransactionBuilder {
            let a = Party::new("PARTY_A", self.a.public_key());
            let b = Party::new("PARTY_B", self.b.public_key());
            TransactionBuilder::new(self.notary.identity().clone())
                .add_output(Record::new(value, a.clone(), b.clone()))
                .add_command(Command::create(vec![a.key, b.key]))
        }

        fn sign_all(&self, builder: TransactionBuilder) -> SignedTransaction {
            let tx = builder.build();
            let id = tx.id();
            SignedTransaction::new(tx)
                .with_signature(self.a.sign(id.as_bytes()))
                .with_signature(self.b.sign(id.as_bytes()))
        }
    }

    #[tokio::test]
    async fn test_notarize_assigns_increasing_sequence() {
        let fx = fixture().await;

        let first = fx.notary.notarize(fx.sign_all(fx.builder(1))).await.unwrap();
        let second = fx.notary.notarize(fx.sign_all(fx.builder(2))).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert!(first.verify_notarization().is_ok());
        assert!(second.verify_notarization().is_ok());
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent() {
        let fx = fixture().await;
        let signed = fx.sign_all(fx.builder(5));

        let first = fx.notary.notarize(signed.clone()).await.unwrap();
        let again = fx.notary.notarize(signed).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(fx.notary.finalized_count(), 1);
        assert_eq!(fx.notary.metrics().snapshot().duplicates, 1);
    }

    #[tokio::test]
    async fn test_refuses_partially_signed() {
        let fx = fixture().await;
        let tx = fx.builder(5).build();
        let id = tx.id();
        let partial = SignedTransaction::new(tx).with_signature(fx.a.sign(id.as_bytes()));

        let err = fx.notary.notarize(partial).await.unwrap_err();
        assert!(matches!(err, NotaryError::InvalidSignatures(_)));
        assert_eq!(fx.notary.finalized_count(), 0);
    }

    #[tokio::test]
    async fn test_refuses_other_notary() {
        let fx = fixture().await;
        let a = Party::new("PARTY_A", fx.a.public_key());
        let b = Party::new("PARTY_B", fx.b.public_key());
        let other = Party::new("OTHER_NOTARY", SigningKey::generate().public_key());
        let builder = TransactionBuilder::new(other)
            .add_output(Record::new(5, a.clone(), b.clone()))
            .add_command(Command::create(vec![a.key, b.key]));

        let err = fx.notary.notarize(fx.sign_all(builder)).await.unwrap_err();
        assert!(matches!(err, NotaryError::WrongNotary { .. }));
    }

    #[tokio::test]
    async fn test_refuses_when_not_running() {
        let fx = fixture().await;
        fx.notary.pause().await;

        let err = fx
            .notary
            .notarize(fx.sign_all(fx.builder(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, NotaryError::Unavailable(_)));

        fx.notary.start().await;
        tokio_test::assert_ok!(fx.notary.notarize(fx.sign_all(fx.builder(5))).await);
    }

    #[tokio::test]
    async fn test_inputs_consumed_once() {
        let fx = fixture().await;
        let input = StateRef {
            tx_id: TransactionId::from_digest([9; 32]),
            index: 0,
        };

        let first = fx.sign_all(fx.builder(1).add_input(input));
        let second = fx.sign_all(fx.builder(2).add_input(input));

        assert!(fx.notary.notarize(first).await.is_ok());
        let err = fx.notary.notarize(second).await.unwrap_err();
        assert!(matches!(err, NotaryError::InputsConsumed { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_requests_get_unique_sequences() {
        let fx = fixture().await;

        let mut handles = Vec::new();
        for value in 1..=20 {
            let notary = fx.notary.clone();
            let signed = fx.sign_all(fx.builder(value));
            handles.push(tokio::spawn(async move { notary.notarize(signed).await }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap().sequence);
        }
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    }
}
