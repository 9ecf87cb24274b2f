//! The IOU issuance contract.
//!
//! [`verify`] is a pure function of the transaction. It never stops at the
//! first failure: every violated rule is reported so a counterparty can
//! explain a rejection completely.

use accord_crypto::sha256_hex;

use crate::{
    CommandKind, Entity, FinalizedTransaction, SignedTransaction, Transaction, Violation,
    ViolationList,
};

/// Prose contract the parties agree to by signing.
pub const IOU_CONTRACT_TEMPLATE: &str = "IOU contract template and params";

/// Hash of [`IOU_CONTRACT_TEMPLATE`] carried by every issued transaction.
pub fn contract_reference() -> String {
    sha256_hex(IOU_CONTRACT_TEMPLATE.as_bytes())
}

/// Anything that can be checked against the issuance contract.
pub trait Validatable {
    /// Run every rule; `Err` lists each failure.
    fn verify(&self) -> Result<(), ViolationList>;
}

impl Validatable for Transaction {
    fn verify(&self) -> Result<(), ViolationList> {
        verify(self)
    }
}

impl Validatable for SignedTransaction {
    fn verify(&self) -> Result<(), ViolationList> {
        verify(&self.tx)
    }
}

impl Validatable for FinalizedTransaction {
    fn verify(&self) -> Result<(), ViolationList> {
        verify(self.tx())
    }
}

/// Check a proposed issuance.
pub fn verify(tx: &Transaction) -> Result<(), ViolationList> {
    let mut violations = ViolationList::new();

    if !tx.inputs().is_empty() {
        violations.push(Violation::InputsConsumed {
            count: tx.inputs().len(),
        });
    }

    if tx.outputs().len() != 1 {
        violations.push(Violation::OutputCount {
            count: tx.outputs().len(),
        });
    }

    let creates: Vec<_> = tx.commands_of(CommandKind::Create).collect();
    if creates.len() != 1 {
        violations.push(Violation::CreateCommand {
            count: creates.len(),
        });
    }
    let signers = creates
        .first()
        .map(|command| command.signers.as_slice())
        .unwrap_or(&[]);

    for record in tx.outputs() {
        let (sender, recipient) = (record.sender(), record.recipient());
        if sender.key == recipient.key || sender.name == recipient.name {
            violations.push(Violation::SameEntity {
                party: record.sender().name.clone(),
            });
        }

        if record.value() <= 0 {
            violations.push(Violation::NonPositiveValue {
                value: record.value(),
            });
        }

        let missing: Vec<_> = record
            .participant_keys()
            .into_iter()
            .filter(|key| !signers.contains(key))
            .collect();
        if !missing.is_empty() {
            violations.push(Violation::MissingSigners { missing });
        }
    }

    violations.into_result()
}
