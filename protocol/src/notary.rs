//! Interface to the finality service.

use async_trait::async_trait;

use accord_common::{FinalizedTransaction, NotaryError, Party, SignedTransaction};

/// A notary that certifies fully signed transactions.
///
/// Implementations check that no input was consumed before, assign a
/// monotonically increasing sequence number and a timestamp, and sign.
/// Submitting the same transaction twice returns the original result.
#[async_trait]
pub trait NotaryService: Send + Sync {
    /// The notary's own identity.
    fn identity(&self) -> &Party;

    /// Finalize a fully signed transaction.
    async fn notarize(&self, tx: SignedTransaction) -> Result<FinalizedTransaction, NotaryError>;
}
