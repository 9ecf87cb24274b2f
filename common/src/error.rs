//! Error types for Accord protocol.

use accord_crypto::{CryptoError, PublicKey};
use thiserror::Error;

use crate::{PartyName, ViolationList};

/// Main error type for Accord operations.
#[derive(Error, Debug)]
pub enum AccordError {
    /// The local contract check failed; nothing was sent or stored.
    #[error("Contract violation: {0}")]
    Violation(ViolationList),

    /// The counterparty re-verified the proposal and declined it.
    #[error("Rejected by {party}: {violations}")]
    Rejected {
        party: PartyName,
        violations: ViolationList,
    },

    /// Transport failure.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Finality service refusal or unavailability.
    #[error("Notary error: {0}")]
    Notary(#[from] NotaryError),

    /// Identity resolution failed.
    #[error("Unknown party: {0}")]
    UnknownParty(PartyName),

    /// Invalid cryptographic signature.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Required signatures are absent.
    #[error("Missing signatures from {} signer(s)", .missing.len())]
    MissingSignatures { missing: Vec<PublicKey> },

    /// Invalid state machine transition.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Persistent store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Crypto error.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl AccordError {
    /// Whether a caller may reasonably start a fresh negotiation after this
    /// error without changing its inputs. The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AccordError::Session(SessionError::Disconnected)
                | AccordError::Session(SessionError::Timeout(_))
                | AccordError::Notary(NotaryError::Unavailable(_))
                | AccordError::Notary(NotaryError::Timeout { .. })
        )
    }

    /// Get error code for protocol messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            AccordError::Violation(_) => "CONTRACT_VIOLATION",
            AccordError::Rejected { .. } => "REJECTED",
            AccordError::Session(_) => "SESSION_ERROR",
            AccordError::Notary(_) => "NOTARY_ERROR",
            AccordError::UnknownParty(_) => "UNKNOWN_PARTY",
            AccordError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AccordError::MissingSignatures { .. } => "MISSING_SIGNATURES",
            AccordError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AccordError::Storage(_) => "STORAGE_ERROR",
            AccordError::Configuration(_) => "CONFIGURATION_ERROR",
            AccordError::Crypto(_) => "CRYPTO_ERROR",
        }
    }

    /// Violations carried by this error, local or remote.
    pub fn violations(&self) -> Option<&ViolationList> {
        match self {
            AccordError::Violation(violations) => Some(violations),
            AccordError::Rejected { violations, .. } => Some(violations),
            _ => None,
        }
    }
}

impl From<ViolationList> for AccordError {
    fn from(violations: ViolationList) -> Self {
        AccordError::Violation(violations)
    }
}

impl From<CryptoError> for AccordError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidSignature | CryptoError::KeyMismatch { .. } => {
                AccordError::InvalidSignature(err.to_string())
            }
            CryptoError::InvalidKey(_) => AccordError::Crypto(err.to_string()),
        }
    }
}

/// Result type alias for Accord operations.
pub type Result<T> = std::result::Result<T, AccordError>;

/// Failures of the point-to-point session between two parties.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Peer went away.
    #[error("Session disconnected")]
    Disconnected,

    /// Bytes could not be decoded into an envelope.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A well-formed message arrived out of protocol order.
    #[error("Unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    /// Envelope timestamp outside the freshness window.
    #[error("Stale message sent at {0}")]
    Stale(String),

    /// Bounded wait expired.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// The target party does not serve this flow type.
    #[error("{party} has no handler for flow {flow}")]
    NoHandler { party: PartyName, flow: String },

    /// The peer aborted the negotiation.
    #[error("Aborted by peer: {0}")]
    Aborted(String),
}

/// Failures reported by, or while talking to, the notary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotaryError {
    /// Service is down or not accepting requests.
    #[error("Notary unavailable: {0}")]
    Unavailable(String),

    /// One or more inputs were already consumed by another transaction.
    #[error("Inputs already consumed: {}", .conflicts.join(", "))]
    InputsConsumed { conflicts: Vec<String> },

    /// The transaction designates a different notary.
    #[error("Wrong notary: transaction names {requested}, this is {actual}")]
    WrongNotary {
        requested: PartyName,
        actual: PartyName,
    },

    /// Signatures are missing or do not verify.
    #[error("Invalid signatures: {0}")]
    InvalidSignatures(String),

    /// The client gave up waiting.
    #[error("Notary did not answer within {millis}ms")]
    Timeout { millis: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Violation;

    #[test]
    fn test_error_codes() {
        let err = AccordError::UnknownParty(PartyName::new("NOBODY"));
        assert_eq!(err.error_code(), "UNKNOWN_PARTY");

        let err: AccordError = NotaryError::Unavailable("down".to_string()).into();
        assert_eq!(err.error_code(), "NOTARY_ERROR");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_violation_is_not_retryable() {
        let err: AccordError =
            ViolationList::from(Violation::NonPositiveValue { value: -1 }).into();

        assert!(!err.is_retryable());
        assert!(err
            .violations()
            .unwrap()
            .contains_message("value must be strictly positive"));
    }

    #[test]
    fn test_conflicting_inputs_are_final() {
        let err: AccordError = NotaryError::InputsConsumed {
            conflicts: vec!["abc:0".to_string()],
        }
        .into();

        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Notary error: Inputs already consumed: abc:0");
    }

    #[test]
    fn test_rejection_display() {
        let err = AccordError::Rejected {
            party: PartyName::new("PARTY_B"),
            violations: Violation::Policy {
                reason: "too large".to_string(),
            }
            .into(),
        };

        assert_eq!(
            err.to_string(),
            "Rejected by PARTY_B: refused by local policy: too large"
        );
    }
}
