//! Party node configuration.

use std::time::Duration;

use accord_common::{constants, DurationExt, PartyName};

/// Configuration for a party node.
#[derive(Debug, Clone)]
pub struct PartyConfig {
    /// Network name of this party.
    pub name: String,
    /// How long the initiator waits for the counterparty's answer.
    pub response_timeout: Duration,
    /// How long the notary client waits for finality.
    pub notary_timeout: Duration,
    /// How long the initiator waits for the acceptor's finality ack.
    pub finality_ack_timeout: Duration,
    /// How long an acceptor waits for the finalized notice after signing.
    pub finality_wait_timeout: Duration,
    /// Largest obligation this party accepts as recipient, if limited.
    pub max_accepted_value: Option<i64>,
}

impl Default for PartyConfig {
    fn default() -> Self {
        Self {
            name: "PARTY".to_string(),
            response_timeout: constants::response_timeout().as_std(),
            notary_timeout: constants::notary_timeout().as_std(),
            finality_ack_timeout: constants::finality_ack_timeout().as_std(),
            finality_wait_timeout: constants::finality_wait_timeout().as_std(),
            max_accepted_value: None,
        }
    }
}

impl PartyConfig {
    /// Default configuration for the named party.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("ACCORD_PARTY_NAME") {
            config.name = name;
        }

        if let Some(timeout) = env_millis("ACCORD_RESPONSE_TIMEOUT_MS") {
            config.response_timeout = timeout;
        }

        if let Some(timeout) = env_millis("ACCORD_NOTARY_TIMEOUT_MS") {
            config.notary_timeout = timeout;
        }

        if let Ok(max) = std::env::var("ACCORD_MAX_ACCEPTED_VALUE") {
            if let Ok(max) = max.parse() {
                config.max_accepted_value = Some(max);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !PartyName::new(self.name.as_str()).is_valid() {
            return Err(format!("Invalid party name: {:?}", self.name));
        }

        if self.response_timeout.is_zero() {
            return Err("Response timeout cannot be zero".to_string());
        }

        if self.notary_timeout.is_zero() {
            return Err("Notary timeout cannot be zero".to_string());
        }

        if let Some(max) = self.max_accepted_value {
            if max <= 0 {
                return Err("Max accepted value must be positive".to_string());
            }
        }

        Ok(())
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}
