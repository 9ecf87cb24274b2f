//! Protocol message types.
//!
//! These types represent the messages exchanged between an initiator and
//! an acceptor during one issuance negotiation. On the wire each message is
//! wrapped in an [`Envelope`] and encoded as JSON.

use accord_common::{
    is_fresh, FinalizedTransaction, PartyName, SessionError, SessionId, SignedTransaction,
    Timestamp, TransactionId, ViolationList,
};
use accord_crypto::Signature;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Wire protocol version.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Message type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Proposal,
    Signature,
    Rejection,
    Finalized,
    FinalityAck,
    Abort,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Proposal => "PROPOSAL",
            MessageType::Signature => "SIGNATURE",
            MessageType::Rejection => "REJECTION",
            MessageType::Finalized => "FINALIZED",
            MessageType::FinalityAck => "FINALITY_ACK",
            MessageType::Abort => "ABORT",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Initiator's proposal, carrying the initiator's own signature.
    Proposal(SignedTransaction),
    /// Acceptor's signature over the proposal's transaction id.
    Signature(Signature),
    /// Acceptor declined; every failed rule is listed.
    Rejection { violations: ViolationList },
    /// Notarized result, sent to the acceptor after finality.
    Finalized(FinalizedTransaction),
    /// Acceptor recorded the finalized transaction.
    FinalityAck { tx_id: TransactionId },
    /// Either side gives up before notarization.
    Abort { reason: String },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Proposal(_) => MessageType::Proposal,
            Message::Signature(_) => MessageType::Signature,
            Message::Rejection { .. } => MessageType::Rejection,
            Message::Finalized(_) => MessageType::Finalized,
            Message::FinalityAck { .. } => MessageType::FinalityAck,
            Message::Abort { .. } => MessageType::Abort,
        }
    }

    /// Error for receiving this message where `expected` was due.
    pub fn unexpected(&self, expected: &str) -> SessionError {
        SessionError::UnexpectedMessage {
            expected: expected.to_string(),
            actual: self.message_type().to_string(),
        }
    }
}

/// Wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version.
    pub version: String,
    /// Message type identifier.
    pub message_type: MessageType,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Sending party.
    pub sender: PartyName,
    /// Send timestamp.
    pub timestamp: Timestamp,
    /// Message body.
    pub body: Message,
}

impl Envelope {
    /// Wrap a message for sending now.
    pub fn new(session_id: SessionId, sender: PartyName, body: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            message_type: body.message_type(),
            session_id,
            sender,
            timestamp: Utc::now(),
            body,
        }
    }

    /// Encode as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SessionError> {
        serde_json::to_vec(self).map_err(|e| SessionError::Malformed(e.to_string()))
    }

    /// Decode and sanity-check received bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, SessionError> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| SessionError::Malformed(e.to_string()))?;
        envelope.check()?;
        Ok(envelope)
    }

    fn check(&self) -> Result<(), SessionError> {
        if self.version != PROTOCOL_VERSION {
            return Err(SessionError::Malformed(format!(
                "unsupported protocol version {}",
                self.version
            )));
        }

        if self.message_type != self.body.message_type() {
            return Err(SessionError::Malformed(format!(
                "header says {} but body is {}",
                self.message_type,
                self.body.message_type()
            )));
        }

        if !is_fresh(self.timestamp) {
            return Err(SessionError::Stale(self.timestamp.to_rfc3339()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_common::{Violation, ViolationList};

    fn envelope(body: Message) -> Envelope {
        Envelope::new(SessionId::new(), PartyName::new("PARTY_A"), body)
    }

    #[test]
    fn test_round_trip() {
        let original = envelope(Message::Rejection {
            violations: Violation::NonPositiveValue { value: 0 }.into(),
        });

        let decoded = Envelope::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.message_type, MessageType::Rejection);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = Envelope::decode(b"not json").unwrap_err();
        assert!(matches!(err, SessionError::Malformed(_)));
    }

    #[test]
    fn test_version_mismatch() {
        let mut env = envelope(Message::Abort {
            reason: "bye".to_string(),
        });
        env.version = "0.9".to_string();

        let err = Envelope::decode(&env.encode().unwrap()).unwrap_err();
        assert!(matches!(err, SessionError::Malformed(_)));
    }

    #[test]
    fn test_header_must_match_body() {
        let mut env = envelope(Message::Rejection {
            violations: ViolationList::new(),
        });
        env.message_type = MessageType::Signature;

        assert!(Envelope::decode(&env.encode().unwrap()).is_err());
    }

    #[test]
    fn test_stale_message() {
        let mut env = envelope(Message::Abort {
            reason: "late".to_string(),
        });
        env.timestamp = Utc::now() - chrono::Duration::minutes(30);

        let err = Envelope::decode(&env.encode().unwrap()).unwrap_err();
        assert!(matches!(err, SessionError::Stale(_)));
    }

    #[test]
    fn test_wire_tag() {
        let env = envelope(Message::Abort {
            reason: "x".to_string(),
        });
        let json: serde_json::Value = serde_json::from_slice(&env.encode().unwrap()).unwrap();

        assert_eq!(json["message_type"], "ABORT");
        assert_eq!(json["body"]["type"], "ABORT");
        assert_eq!(json["body"]["payload"]["reason"], "x");
    }
}
