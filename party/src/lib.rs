//! Accord Party Library
//!
//! Everything a party needs to take part in bilateral IOU issuance: the
//! transaction assembler, the initiator and acceptor state machines, the
//! signature collector and the notary client, wired together by
//! [`PartyNode`].

pub mod assembler;
pub mod collector;
pub mod config;
pub mod flows;
pub mod node;
pub mod notary_client;
pub mod policy;

pub use collector::SignatureCollector;
pub use config::PartyConfig;
pub use flows::{Acceptor, AcceptorState, FlowContext, FlowState, Initiator, InitiatorState};
pub use node::{NodeState, PartyNode, PartyNodeBuilder};
pub use notary_client::NotaryClient;
pub use policy::{AcceptAll, AcceptancePolicy, CallbackPolicy, MaxValuePolicy};
