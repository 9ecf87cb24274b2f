//! Accord Notary
//!
//! The notary is the trusted party that gives a fully signed transaction
//! its canonical, final form: it checks that no input has been consumed
//! before, assigns a sequence number and a timestamp, and signs.

pub mod config;
pub mod metrics;
pub mod notary;
pub mod state;

pub use config::NotaryConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use notary::Notary;
pub use state::NotaryState;
