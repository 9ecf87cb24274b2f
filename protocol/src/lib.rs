//! Accord Protocol
//!
//! Wire messages exchanged between parties, the session abstraction they
//! travel over, and the interfaces to the identity directory and the notary.

pub mod identity;
pub mod messages;
pub mod notary;
pub mod session;

pub use identity::{IdentityService, NetworkMap, ResolvedParty};
pub use messages::*;
pub use notary::NotaryService;
pub use session::memory::{InMemoryNetwork, MemorySession};
pub use session::{FlowType, IncomingSession, Session, SessionTransport};
