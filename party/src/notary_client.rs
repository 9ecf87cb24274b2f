//! Client side of notarization.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use accord_common::{FinalizedTransaction, NotaryError, Party, SignedTransaction};
use accord_protocol::NotaryService;

/// Submits fully signed transactions to the notary, with a bounded wait.
///
/// Never retries: a caller that sees a retryable error starts over.
#[derive(Clone)]
pub struct NotaryClient {
    notary: Arc<dyn NotaryService>,
    timeout: Duration,
}

impl NotaryClient {
    pub fn new(notary: Arc<dyn NotaryService>, timeout: Duration) -> Self {
        Self { notary, timeout }
    }

    /// Identity of the notary behind this client.
    pub fn notary(&self) -> &Party {
        self.notary.identity()
    }

    /// Obtain the notary's certificate for `tx`.
    #[instrument(skip(self, tx), fields(tx_id = %tx.id().short()))]
    pub async fn notarize(
        &self,
        tx: SignedTransaction,
    ) -> Result<FinalizedTransaction, NotaryError> {
        let id = tx.id();

        let finalized = match tokio::time::timeout(self.timeout, self.notary.notarize(tx)).await {
            Ok(result) => result?,
            Err(_) => {
                let millis = self.timeout.as_millis() as u64;
                warn!(millis, "Notary did not answer in time");
                return Err(NotaryError::Timeout { millis });
            }
        };

        if finalized.id() != id {
            return Err(NotaryError::InvalidSignatures(format!(
                "notary answered for {} instead of {}",
                finalized.id(),
                id
            )));
        }

        finalized
            .verify_notarization()
            .map_err(|e| NotaryError::InvalidSignatures(e.to_string()))?;

        info!(sequence = finalized.sequence, "Notarized");
        Ok(finalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use accord_crypto::SigningKey;
    use accord_notary::{Notary, NotaryConfig};

    struct SlowNotary {
        identity: Party,
    }

    #[async_trait]
    impl NotaryService for SlowNotary {
        fn identity(&self) -> &Party {
            &self.identity
        }

        async fn notarize(
            &self,
            _tx: SignedTransaction,
        ) -> Result<FinalizedTransaction, NotaryError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(NotaryError::Unavailable("never".to_string()))
        }
    }

    fn signed_for(notary: &Party) -> SignedTransaction {
        let a_key = SigningKey::generate();
        let b_key = SigningKey::generate();
        let a = Party::new("PARTY_A", a_key.public_key());
        let b = Party::new("PARTY_B", b_key.public_key());
        let tx = crate::assembler::build(10, &a, &b, notary);
        let id = tx.id();
        SignedTransaction::new(tx)
            .with_signature(a_key.sign(id.as_bytes()))
            .with_signature(b_key.sign(id.as_bytes()))
    }

    #[tokio::test]
    async fn test_notarize_through_client() {
        let notary = Arc::new(Notary::new(
            NotaryConfig::default(),
            Arc::new(SigningKey::generate()),
        ));
        notary.start().await;
        let client = NotaryClient::new(notary.clone(), Duration::from_secs(1));

        let finalized = client.notarize(signed_for(client.notary())).await.unwrap();
        assert_eq!(finalized.sequence, 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_reported() {
        let notary = Arc::new(Notary::new(
            NotaryConfig::default(),
            Arc::new(SigningKey::generate()),
        ));
        let client = NotaryClient::new(notary.clone(), Duration::from_secs(1));

        let err = client.notarize(signed_for(client.notary())).await.unwrap_err();
        assert!(matches!(err, NotaryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = SlowNotary {
            identity: Party::new("NOTARY", SigningKey::generate().public_key()),
        };
        let tx = signed_for(&slow.identity);
        let client = NotaryClient::new(Arc::new(slow), Duration::from_millis(100));

        let err = client.notarize(tx).await.unwrap_err();
        assert_eq!(err, NotaryError::Timeout { millis: 100 });
    }
}
