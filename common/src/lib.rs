//! Accord Common Types
//!
//! This crate contains the types shared by every Accord component: the
//! obligation record, the transaction envelope and its signatures, the
//! issuance contract (validator) and the error taxonomy.

pub mod contract;
pub mod error;
pub mod identifiers;
pub mod party;
pub mod record;
pub mod time;
pub mod transaction;
pub mod violation;

pub use contract::{contract_reference, verify, Validatable, IOU_CONTRACT_TEMPLATE};
pub use error::*;
pub use identifiers::*;
pub use party::Party;
pub use record::{Entity, Record};
pub use time::*;
pub use transaction::*;
pub use violation::{Violation, ViolationList};
