//! Time utilities and constants for the Accord protocol.

use chrono::{DateTime, Duration, Utc};

/// Protocol timing constants.
pub mod constants {
    use super::Duration;

    /// How long an initiator waits for the counterparty's signature or
    /// rejection (30 seconds). Expiry counts as a rejection.
    pub fn response_timeout() -> Duration {
        Duration::seconds(30)
    }

    /// How long the notary client waits for a finalized result (10 seconds).
    pub fn notary_timeout() -> Duration {
        Duration::seconds(10)
    }

    /// How long an initiator waits for the acceptor's finality ack (5 seconds).
    pub fn finality_ack_timeout() -> Duration {
        Duration::seconds(5)
    }

    /// How long an acceptor waits for the finalized notice after signing
    /// (60 seconds).
    pub fn finality_wait_timeout() -> Duration {
        Duration::seconds(60)
    }

    /// Message freshness window (5 minutes).
    pub fn message_freshness_window() -> Duration {
        Duration::minutes(5)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp is within the freshness window.
pub fn is_fresh(timestamp: Timestamp) -> bool {
    let diff = (now() - timestamp).abs();
    diff < constants::message_freshness_window()
}

/// Conversion into the std duration tokio expects.
pub trait DurationExt {
    fn as_std(&self) -> std::time::Duration;
}

impl DurationExt for Duration {
    fn as_std(&self) -> std::time::Duration {
        self.to_std().unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh() {
        let recent = now() - Duration::seconds(10);
        assert!(is_fresh(recent));

        let old = now() - Duration::minutes(10);
        assert!(!is_fresh(old));

        let skewed = now() + Duration::minutes(10);
        assert!(!is_fresh(skewed));
    }

    #[test]
    fn test_negative_duration_clamps_to_zero() {
        assert_eq!(Duration::seconds(-1).as_std(), std::time::Duration::ZERO);
        assert_eq!(
            constants::notary_timeout().as_std(),
            std::time::Duration::from_secs(10)
        );
    }
}
