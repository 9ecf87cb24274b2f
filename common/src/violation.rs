//! Named rule failures reported by the contract and by counterparties.

use std::fmt;

use accord_crypto::PublicKey;
use serde::{Deserialize, Serialize};

use crate::PartyName;

/// A single failed rule.
///
/// The `Display` text of each contract rule is stable; callers and tests
/// match on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    /// Issuance consumed existing states.
    #[error("no inputs may be consumed on issuance")]
    InputsConsumed { count: usize },

    /// Wrong number of output records.
    #[error("exactly one output required")]
    OutputCount { count: usize },

    /// Missing or repeated `Create` command.
    #[error("exactly one Create command required")]
    CreateCommand { count: usize },

    /// Sender and recipient are the same party.
    #[error("sender and recipient cannot be the same entity")]
    SameEntity { party: PartyName },

    /// Zero or negative obligation.
    #[error("value must be strictly positive")]
    NonPositiveValue { value: i64 },

    /// A participant's key is absent from the command signers.
    #[error("all participants must be signers")]
    MissingSigners { missing: Vec<PublicKey> },

    /// A signature the counterparty relies on is absent or does not verify.
    #[error("signature from {key} is missing or invalid")]
    UnverifiedSignature { key: PublicKey },

    /// The reviewing party is not asked to sign.
    #[error("{party} is not a required signer")]
    NotASigner { party: PartyName },

    /// The session was opened by someone other than the record's sender.
    #[error("proposal from {proposer} names {sender} as sender")]
    ProposerMismatch { proposer: PartyName, sender: PartyName },

    /// The record's recipient is not the reviewing party.
    #[error("recipient {named} is not {reviewer}")]
    RecipientMismatch { reviewer: PartyName, named: PartyName },

    /// The counterparty gave no answer in time; treated as a refusal.
    #[error("counterparty did not respond within {waited_ms}ms")]
    NoResponse { waited_ms: u64 },

    /// Refused by the reviewing party's own acceptance rules.
    #[error("refused by local policy: {reason}")]
    Policy { reason: String },
}

impl Violation {
    /// Get a stable code for the rule.
    pub fn code(&self) -> &'static str {
        match self {
            Violation::InputsConsumed { .. } => "INPUTS_CONSUMED",
            Violation::OutputCount { .. } => "OUTPUT_COUNT",
            Violation::CreateCommand { .. } => "CREATE_COMMAND",
            Violation::SameEntity { .. } => "SAME_ENTITY",
            Violation::NonPositiveValue { .. } => "NON_POSITIVE_VALUE",
            Violation::MissingSigners { .. } => "MISSING_SIGNERS",
            Violation::UnverifiedSignature { .. } => "UNVERIFIED_SIGNATURE",
            Violation::NotASigner { .. } => "NOT_A_SIGNER",
            Violation::ProposerMismatch { .. } => "PROPOSER_MISMATCH",
            Violation::RecipientMismatch { .. } => "RECIPIENT_MISMATCH",
            Violation::NoResponse { .. } => "NO_RESPONSE",
            Violation::Policy { .. } => "POLICY",
        }
    }
}

/// Every rule a transaction failed, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationList(Vec<Violation>);

impl ViolationList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Record a failed rule.
    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    /// `Ok` when nothing was recorded.
    pub fn into_result(self) -> Result<(), ViolationList> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    /// Human-readable messages.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(|v| v.to_string()).collect()
    }

    /// Whether any violation carries the given message.
    pub fn contains_message(&self, message: &str) -> bool {
        self.0.iter().any(|v| v.to_string() == message)
    }

    /// Whether any violation has the given code.
    pub fn contains_code(&self, code: &str) -> bool {
        self.0.iter().any(|v| v.code() == code)
    }
}

impl From<Violation> for ViolationList {
    fn from(violation: Violation) -> Self {
        Self(vec![violation])
    }
}

impl FromIterator<Violation> for ViolationList {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ViolationList {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ViolationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.messages();
        write!(f, "{}", messages.join("; "))
    }
}
