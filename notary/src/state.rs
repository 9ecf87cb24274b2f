//! Notary state definitions.

/// Notary operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotaryState {
    /// Notary is starting up.
    Starting,
    /// Notary is running and accepting requests.
    Running,
    /// Notary is temporarily refusing requests.
    Paused,
    /// Notary is stopped.
    Stopped,
}

impl NotaryState {
    /// Check if the notary is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, NotaryState::Running)
    }

    /// Check if the notary is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NotaryState::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotaryState::Starting => "starting",
            NotaryState::Running => "running",
            NotaryState::Paused => "paused",
            NotaryState::Stopped => "stopped",
        }
    }
}
