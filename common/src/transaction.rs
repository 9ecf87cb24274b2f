//! Transaction envelope, signature bundle and finalized form.

use std::collections::BTreeMap;
use std::fmt;

use accord_crypto::{sha256, PublicKey, Signature};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::contract_reference;
use crate::{AccordError, Entity, Party, Record, Result, TransactionId};

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateRef {
    /// Transaction that produced the state.
    pub tx_id: TransactionId,
    /// Output index within that transaction.
    pub index: u32,
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

/// Intent of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// Issue a new obligation.
    Create,
}

/// A command tag together with the keys that must sign for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub signers: Vec<PublicKey>,
}

impl Command {
    /// A `Create` command signed by `signers`.
    pub fn create(signers: Vec<PublicKey>) -> Self {
        Self {
            kind: CommandKind::Create,
            signers,
        }
    }
}

/// An unsigned, immutable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    inputs: Vec<StateRef>,
    outputs: Vec<Record>,
    commands: Vec<Command>,
    notary: Party,
    contract_reference: String,
}

impl Transaction {
    /// Content-derived identifier. Parties sign these bytes.
    pub fn id(&self) -> TransactionId {
        TransactionId::from_digest(sha256(&self.canonical_bytes()))
    }

    pub fn inputs(&self) -> &[StateRef] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Record] {
        &self.outputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Notary designated to finalize this transaction.
    pub fn notary(&self) -> &Party {
        &self.notary
    }

    /// Hash of the prose contract the parties agree to.
    pub fn contract_reference(&self) -> &str {
        &self.contract_reference
    }

    /// The single output, when there is exactly one.
    pub fn single_output(&self) -> Option<&Record> {
        match self.outputs.as_slice() {
            [record] => Some(record),
            _ => None,
        }
    }

    /// Commands of the given kind.
    pub fn commands_of(&self, kind: CommandKind) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(move |c| c.kind == kind)
    }

    /// Keys of every output participant, order-stable and de-duplicated.
    pub fn required_signers(&self) -> Vec<PublicKey> {
        let mut keys: Vec<PublicKey> = Vec::new();
        for key in self.outputs.iter().flat_map(|record| record.participant_keys()) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = String::new();

        for input in &self.inputs {
            out.push_str(&format!("in:{};", input));
        }

        for record in &self.outputs {
            out.push_str(&format!(
                "out:{}:{}:{}:{};",
                record.id(),
                record.value(),
                record.sender().canonical(),
                record.recipient().canonical()
            ));
        }

        for command in &self.commands {
            out.push_str(&format!("cmd:{:?}:", command.kind));
            for signer in &command.signers {
                out.push_str(&signer.to_hex());
                out.push(',');
            }
            out.push(';');
        }

        out.push_str(&format!(
            "notary:{};contract:{}",
            self.notary.canonical(),
            self.contract_reference
        ));

        out.into_bytes()
    }
}

/// Incremental construction of a [`Transaction`].
///
/// Performs no validation; see [`crate::contract::verify`].
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    notary: Party,
    inputs: Vec<StateRef>,
    outputs: Vec<Record>,
    commands: Vec<Command>,
    contract_reference: String,
}

impl TransactionBuilder {
    /// Start a transaction finalized by `notary`.
    pub fn new(notary: Party) -> Self {
        Self {
            notary,
            inputs: Vec::new(),
            outputs: Vec::new(),
            commands: Vec::new(),
            contract_reference: contract_reference(),
        }
    }

    pub fn add_input(mut self, input: StateRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(mut self, record: Record) -> Self {
        self.outputs.push(record);
        self
    }

    pub fn add_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Override the contract reference hash.
    pub fn contract_reference(mut self, reference: impl Into<String>) -> Self {
        self.contract_reference = reference.into();
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            inputs: self.inputs,
            outputs: self.outputs,
            commands: self.commands,
            notary: self.notary,
            contract_reference: self.contract_reference,
        }
    }
}

/// Signatures keyed by signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle(BTreeMap<PublicKey, Signature>);

impl SignatureBundle {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add a signature, replacing any earlier one from the same key.
    pub fn insert(&mut self, signature: Signature) -> Option<Signature> {
        self.0.insert(signature.key, signature)
    }

    /// Add every signature from `other`.
    pub fn merge(&mut self, other: SignatureBundle) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &PublicKey) -> Option<&Signature> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PublicKey, &Signature)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys from `required` with no signature yet.
    pub fn missing(&self, required: &[PublicKey]) -> Vec<PublicKey> {
        required
            .iter()
            .filter(|key| !self.0.contains_key(*key))
            .copied()
            .collect()
    }

    /// Whether the bundle covers every key in `required`.
    pub fn covers(&self, required: &[PublicKey]) -> bool {
        self.missing(required).is_empty()
    }
}

/// A transaction plus the signatures collected so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub signatures: SignatureBundle,
}

impl SignedTransaction {
    /// Wrap a transaction with no signatures.
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: SignatureBundle::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tx.id()
    }

    /// Attach a signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signatures.insert(signature);
        self
    }

    /// Merge signatures gathered on another copy of the same transaction.
    pub fn merge(&mut self, other: SignedTransaction) -> Result<()> {
        if other.id() != self.id() {
            return Err(AccordError::InvalidSignature(format!(
                "cannot merge signatures for {} into {}",
                other.id(),
                self.id()
            )));
        }
        self.signatures.merge(other.signatures);
        Ok(())
    }

    pub fn missing_signers(&self) -> Vec<PublicKey> {
        self.signatures.missing(&self.tx.required_signers())
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.covers(&self.tx.required_signers())
    }

    /// Every attached signature verifies and no required signer is missing.
    pub fn verify_signatures(&self) -> Result<()> {
        self.verify_signatures_except(&[])
    }

    /// Like [`verify_signatures`](Self::verify_signatures) but tolerates the
    /// absence of signatures from `allowed_missing`.
    pub fn verify_signatures_except(&self, allowed_missing: &[PublicKey]) -> Result<()> {
        let id = self.id();
        for (key, signature) in self.signatures.iter() {
            key.verify(id.as_bytes(), signature)?;
        }

        let missing: Vec<PublicKey> = self
            .missing_signers()
            .into_iter()
            .filter(|key| !allowed_missing.contains(key))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AccordError::MissingSignatures { missing })
        }
    }
}

/// A transaction certified by the notary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    pub signed: SignedTransaction,
    /// Position in the notary's canonical ordering.
    pub sequence: u64,
    /// Notary timestamp.
    pub timestamp: DateTime<Utc>,
    pub notary_signature: Signature,
}

impl FinalizedTransaction {
    /// Bytes the notary signs.
    pub fn notarization_payload(
        id: &TransactionId,
        sequence: u64,
        timestamp: &DateTime<Utc>,
    ) -> Vec<u8> {
        format!(
            "{}:{}:{}",
            id,
            sequence,
            timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
        .into_bytes()
    }

    pub fn id(&self) -> TransactionId {
        self.signed.id()
    }

    pub fn tx(&self) -> &Transaction {
        &self.signed.tx
    }

    /// The issued record.
    pub fn record(&self) -> Option<&Record> {
        self.signed.tx.single_output()
    }

    /// Check the notary's certificate and every party signature.
    pub fn verify_notarization(&self) -> Result<()> {
        let notary = self.signed.tx.notary();
        let payload = Self::notarization_payload(&self.id(), self.sequence, &self.timestamp);

        notary.key.verify(&payload, &self.notary_signature)?;
        self.signed.verify_signatures()
    }
}
