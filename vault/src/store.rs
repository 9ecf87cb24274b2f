//! Finalized transaction storage.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, instrument};

use accord_common::{
    AccordError, Entity, FinalizedTransaction, Party, PartyName, Record, Result, TransactionId,
};

use crate::balance::ObligationSummary;
use crate::journal::JournalEntry;

/// Durable home for finalized transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Record a finalized transaction. Storing the same transaction again
    /// is a no-op.
    async fn store(&self, tx: FinalizedTransaction) -> Result<()>;

    /// Look up a finalized transaction by id.
    async fn lookup(&self, id: &TransactionId) -> Result<Option<FinalizedTransaction>>;

    /// Records the named party takes part in, in notary order.
    async fn records_for(&self, party: &PartyName) -> Result<Vec<Record>>;

    /// Totals owed by and to the store's owner.
    async fn summary(&self) -> Result<ObligationSummary>;
}

/// One party's vault, held in memory.
pub struct InMemoryVault {
    owner: Party,
    transactions: DashMap<TransactionId, FinalizedTransaction>,
    journal: RwLock<Vec<JournalEntry>>,
}

impl InMemoryVault {
    /// Create an empty vault for `owner`.
    pub fn new(owner: Party) -> Self {
        Self {
            owner,
            transactions: DashMap::new(),
            journal: RwLock::new(Vec::new()),
        }
    }

    pub fn owner(&self) -> &Party {
        &self.owner
    }

    /// Number of stored transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Snapshot of the journal.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.journal.read().clone()
    }
}

#[async_trait]
impl TransactionStore for InMemoryVault {
    #[instrument(skip(self, tx), fields(owner = %self.owner.name, tx_id = %tx.id().short()))]
    async fn store(&self, tx: FinalizedTransaction) -> Result<()> {
        let id = tx.id();

        // Hold the entry until the journal is updated.
        let slot = match self.transactions.entry(id) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.sequence != tx.sequence {
                    return Err(AccordError::Storage(format!(
                        "transaction {} already stored with sequence {}",
                        id, existing.sequence
                    )));
                }
                debug!("Transaction already stored");
                return Ok(());
            }
            Entry::Vacant(slot) => slot,
        };

        let entries: Vec<JournalEntry> = tx
            .tx()
            .outputs()
            .iter()
            .filter_map(|record| JournalEntry::for_owner(&self.owner, id, tx.sequence, record))
            .collect();

        info!(
            sequence = tx.sequence,
            relevant = entries.len(),
            "Recording finalized transaction"
        );

        {
            let mut journal = self.journal.write();
            journal.extend(entries);
            journal.sort_by_key(|entry| entry.sequence);
        }
        slot.insert(tx);

        Ok(())
    }

    async fn lookup(&self, id: &TransactionId) -> Result<Option<FinalizedTransaction>> {
        Ok(self.transactions.get(id).map(|entry| entry.value().clone()))
    }

    async fn records_for(&self, party: &PartyName) -> Result<Vec<Record>> {
        let mut found: Vec<(u64, Record)> = self
            .transactions
            .iter()
            .flat_map(|entry| {
                let sequence = entry.value().sequence;
                entry
                    .value()
                    .tx()
                    .outputs()
                    .iter()
                    .filter(|record| record.participants().iter().any(|p| &p.name == party))
                    .map(|record| (sequence, record.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        found.sort_by_key(|(sequence, _)| *sequence);
        Ok(found.into_iter().map(|(_, record)| record).collect())
    }

    async fn summary(&self) -> Result<ObligationSummary> {
        let journal = self.journal.read();
        Ok(ObligationSummary::from_entries(
            self.owner.name.clone(),
            journal.iter(),
        ))
    }
}
