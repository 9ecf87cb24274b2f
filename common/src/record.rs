//! The obligation record: an IOU from a sender to a recipient.

use accord_crypto::PublicKey;
use serde::{Deserialize, Serialize};

use crate::{Party, RecordId};

/// Something with a stable identity shared between participants.
pub trait Entity {
    /// Identifier, stable for the entity's lifetime.
    fn id(&self) -> RecordId;

    /// Parties involved, in a stable order.
    fn participants(&self) -> Vec<&Party>;

    /// Keys of the participants, in participant order, without duplicates.
    fn participant_keys(&self) -> Vec<PublicKey> {
        let mut keys: Vec<PublicKey> = Vec::new();
        for party in self.participants() {
            if !keys.contains(&party.key) {
                keys.push(party.key);
            }
        }
        keys
    }

    /// Whether any of `our_keys` belongs to a participant.
    fn is_relevant(&self, our_keys: &[PublicKey]) -> bool {
        self.participants()
            .iter()
            .any(|party| our_keys.contains(&party.key))
    }
}

/// An obligation of `value` owed by `sender` to `recipient`.
///
/// Construction never fails: invalid values or parties are representable so
/// the contract can report them. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    value: i64,
    sender: Party,
    recipient: Party,
}

impl Record {
    /// Create a record with a fresh id.
    pub fn new(value: i64, sender: Party, recipient: Party) -> Self {
        Self {
            id: RecordId::new(),
            value,
            sender,
            recipient,
        }
    }

    /// Amount owed.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Party issuing the obligation.
    pub fn sender(&self) -> &Party {
        &self.sender
    }

    /// Party receiving and approving the obligation.
    pub fn recipient(&self) -> &Party {
        &self.recipient
    }
}

impl Entity for Record {
    fn id(&self) -> RecordId {
        self.id
    }

    fn participants(&self) -> Vec<&Party> {
        vec![&self.sender, &self.recipient]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_crypto::SigningKey;

    fn party(name: &str) -> Party {
        Party::new(name, SigningKey::generate().public_key())
    }

    #[test]
    fn test_record_has_fresh_id() {
        let a = party("PARTY_A");
        let b = party("PARTY_B");

        let first = Record::new(10, a.clone(), b.clone());
        let second = Record::new(10, a, b);

        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_participants_order_is_sender_then_recipient() {
        let a = party("PARTY_A");
        let b = party("PARTY_B");
        let record = Record::new(1, a.clone(), b.clone());

        assert_eq!(record.participants(), vec![&a, &b]);
        assert_eq!(record.participant_keys(), vec![a.key, b.key]);
    }

    #[test]
    fn test_participant_keys_deduplicated() {
        let a = party("PARTY_A");
        let record = Record::new(1, a.clone(), a.clone());

        assert_eq!(record.participant_keys(), vec![a.key]);
    }

    #[test]
    fn test_relevance() {
        let a = party("PARTY_A");
        let b = party("PARTY_B");
        let c = party("PARTY_C");
        let record = Record::new(5, a.clone(), b);

        assert!(record.is_relevant(&[a.key]));
        assert!(!record.is_relevant(&[c.key]));
        assert!(!record.is_relevant(&[]));
    }
}
