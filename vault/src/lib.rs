//! Accord Vault
//!
//! Storage for finalized transactions, the per-party obligation journal
//! derived from them, and checkpoints of in-flight negotiations.

pub mod balance;
pub mod checkpoint;
pub mod journal;
pub mod store;

pub use balance::ObligationSummary;
pub use checkpoint::{Checkpoint, CheckpointStore, InMemoryCheckpoints};
pub use journal::{JournalEntry, Position};
pub use store::{InMemoryVault, TransactionStore};
