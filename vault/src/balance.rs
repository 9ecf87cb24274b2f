//! Obligation totals derived from the journal.

use accord_common::PartyName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journal::{JournalEntry, Position};

/// Totals of everything a party owes and is owed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationSummary {
    /// Vault owner.
    pub party: PartyName,
    /// Sum of obligations the owner issued.
    pub payable: i128,
    /// Sum of obligations issued to the owner.
    pub receivable: i128,
    /// Number of records counted.
    pub records: usize,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl ObligationSummary {
    /// Summarize `entries` for `party`.
    pub fn from_entries<'a>(
        party: PartyName,
        entries: impl IntoIterator<Item = &'a JournalEntry>,
    ) -> Self {
        let mut summary = Self {
            party,
            payable: 0,
            receivable: 0,
            records: 0,
            updated_at: Utc::now(),
        };

        for entry in entries {
            let value = i128::from(entry.record.value());
            match entry.position {
                Position::Payable => summary.payable += value,
                Position::Receivable => summary.receivable += value,
            }
            summary.records += 1;
        }

        summary
    }

    /// Receivable minus payable.
    pub fn net(&self) -> i128 {
        self.receivable - self.payable
    }
}
