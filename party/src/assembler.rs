//! Builds the unsigned issuance transaction.

use accord_common::{Command, Party, Record, Transaction, TransactionBuilder};

/// Assemble an issuance of `value` from `sender` to `recipient`.
///
/// The `Create` command names both participants as signers, sender first.
/// Nothing is validated here; invalid inputs produce a transaction the
/// contract will reject with a diagnostic.
pub fn build(value: i64, sender: &Party, recipient: &Party, notary: &Party) -> Transaction {
    let record = Record::new(value, sender.clone(), recipient.clone());
    let signers = vec![sender.key, recipient.key];

    TransactionBuilder::new(notary.clone())
        .add_output(record)
        .add_command(Command::create(signers))
        .build()
}
