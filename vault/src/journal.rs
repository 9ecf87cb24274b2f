//! Vault journal: one entry per relevant record of a stored transaction.

use accord_common::{Entity, Party, Record, RecordId, TransactionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of an obligation the vault's owner is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Owner is the sender and owes the value.
    Payable,
    /// Owner is the recipient and is owed the value.
    Receivable,
}

/// A single journal entry in the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Transaction that issued the record.
    pub tx_id: TransactionId,
    /// Notary sequence of that transaction.
    pub sequence: u64,
    /// The record itself.
    pub record: Record,
    /// Owner's side of the obligation.
    pub position: Position,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Entry for `owner`, or `None` when the record does not involve them.
    pub fn for_owner(
        owner: &Party,
        tx_id: TransactionId,
        sequence: u64,
        record: &Record,
    ) -> Option<Self> {
        if !record.is_relevant(&[owner.key]) {
            return None;
        }

        let position = if record.sender() == owner {
            Position::Payable
        } else {
            Position::Receivable
        };

        Some(Self {
            id: Uuid::new_v4(),
            tx_id,
            sequence,
            record: record.clone(),
            position,
            created_at: Utc::now(),
        })
    }

    pub fn record_id(&self) -> RecordId {
        self.record.id()
    }

    /// Value from the owner's point of view: negative when owed by them.
    pub fn signed_value(&self) -> i64 {
        match self.position {
            Position::Payable => -self.record.value(),
            Position::Receivable => self.record.value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_crypto::SigningKey;

    #[test]
    fn test_positions() {
        let a = Party::new("PARTY_A", SigningKey::generate().public_key());
        let b = Party::new("PARTY_B", SigningKey::generate().public_key());
        let c = Party::new("PARTY_C", SigningKey::generate().public_key());
        let record = Record::new(25, a.clone(), b.clone());
        let tx_id = TransactionId::from_digest([3; 32]);

        let payable = JournalEntry::for_owner(&a, tx_id, 1, &record).unwrap();
        assert_eq!(payable.position, Position::Payable);
        assert_eq!(payable.signed_value(), -25);

        let receivable = JournalEntry::for_owner(&b, tx_id, 1, &record).unwrap();
        assert_eq!(receivable.position, Position::Receivable);
        assert_eq!(receivable.signed_value(), 25);

        assert!(JournalEntry::for_owner(&c, tx_id, 1, &record).is_none());
    }
}
