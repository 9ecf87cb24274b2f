//! Notary configuration.

use std::time::Duration;

use accord_common::PartyName;

/// Main notary configuration.
#[derive(Debug, Clone)]
pub struct NotaryConfig {
    /// Network name of the notary.
    pub name: String,
    /// Artificial delay before each notarization. Zero in production; the
    /// simulator raises it to exercise client timeouts.
    pub processing_delay: Duration,
    /// Upper bound on `processing_delay`.
    pub max_processing_delay: Duration,
    /// Log level.
    pub log_level: String,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            name: "NOTARY".to_string(),
            processing_delay: Duration::ZERO,
            max_processing_delay: Duration::from_secs(60),
            log_level: "info".to_string(),
        }
    }
}

impl NotaryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("ACCORD_NOTARY_NAME") {
            config.name = name;
        }

        if let Ok(delay) = std::env::var("ACCORD_NOTARY_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                config.processing_delay = Duration::from_millis(ms);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !PartyName::new(self.name.as_str()).is_valid() {
            return Err(format!("Invalid notary name: {:?}", self.name));
        }

        if self.processing_delay > self.max_processing_delay {
            return Err("Processing delay cannot exceed max processing delay".to_string());
        }

        Ok(())
    }
}
