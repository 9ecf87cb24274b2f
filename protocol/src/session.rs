//! Point-to-point sessions between parties.
//!
//! A session is ordered and reliable for the lifetime of one negotiation.
//! Transports only move bytes; every message is encoded into an
//! [`Envelope`](crate::Envelope) on send and decoded on receive, so a
//! corrupted or out-of-date payload surfaces as a [`SessionError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use accord_common::{PartyName, SessionError, SessionId};

use crate::Message;

/// Kind of negotiation a session is opened for.
///
/// A party only accepts sessions for flow types it registered a handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowType {
    /// Two-party IOU issuance.
    IssueObligation,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowType::IssueObligation => "ISSUE_OBLIGATION",
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of an open session.
#[async_trait]
pub trait Session: Send {
    /// Session identifier, shared by both ends.
    fn id(&self) -> SessionId;

    /// Party on the other end.
    fn counterparty(&self) -> &PartyName;

    /// Send a message to the peer.
    async fn send(&mut self, message: Message) -> Result<(), SessionError>;

    /// Receive the next message.
    ///
    /// Blocks until a message arrives or the peer goes away.
    async fn receive(&mut self) -> Result<Message, SessionError>;

    /// Close this end. Further sends fail with `Disconnected`.
    async fn close(&mut self);
}

/// Opens sessions to other parties and delivers sessions opened by them.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Accept sessions for `flow` at `party`.
    ///
    /// Incoming sessions are delivered on the returned receiver. A later
    /// registration for the same key replaces the earlier one.
    fn register(&self, party: &PartyName, flow: FlowType) -> mpsc::Receiver<IncomingSession>;

    /// Stop accepting sessions for `flow` at `party`.
    fn deregister(&self, party: &PartyName, flow: FlowType);

    /// Open a session from `from` to `to` for `flow`.
    ///
    /// Fails with [`SessionError::NoHandler`] when `to` has not registered
    /// for `flow`.
    async fn open(
        &self,
        from: &PartyName,
        to: &PartyName,
        flow: FlowType,
    ) -> Result<Box<dyn Session>, SessionError>;
}

/// A session opened by another party, handed to the registered handler.
pub struct IncomingSession {
    /// Party that opened the session.
    pub initiator: PartyName,
    /// Flow the session was opened for.
    pub flow: FlowType,
    /// Acceptor's end.
    pub session: Box<dyn Session>,
}

impl std::fmt::Debug for IncomingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingSession")
            .field("initiator", &self.initiator)
            .field("flow", &self.flow)
            .field("session_id", &self.session.id())
            .finish()
    }
}

/// In-memory transport for tests and the simulator.
///
/// Uses channels to simulate connections between parties in one process.
pub mod memory {
    use std::sync::atomic::{AtomicU64, Ordering};

    use dashmap::DashMap;
    use tracing::debug;

    use super::*;
    use crate::Envelope;

    const CHANNEL_CAPACITY: usize = 32;
    const HANDLER_BACKLOG: usize = 64;

    /// Create a pair of connected in-memory sessions.
    pub fn session_pair(a: PartyName, b: PartyName) -> (MemorySession, MemorySession) {
        let id = SessionId::new();
        let (tx1, rx1) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx2, rx2) = mpsc::channel(CHANNEL_CAPACITY);

        let first = MemorySession {
            id,
            local: a.clone(),
            counterparty: b.clone(),
            tx: tx1,
            rx: rx2,
            connected: true,
        };

        let second = MemorySession {
            id,
            local: b,
            counterparty: a,
            tx: tx2,
            rx: rx1,
            connected: true,
        };

        (first, second)
    }

    /// In-memory session endpoint.
    pub struct MemorySession {
        id: SessionId,
        local: PartyName,
        counterparty: PartyName,
        tx: mpsc::Sender<Vec<u8>>,
        rx: mpsc::Receiver<Vec<u8>>,
        connected: bool,
    }

    impl MemorySession {
        /// Push bytes to the peer without enveloping them.
        pub async fn send_raw(&mut self, bytes: Vec<u8>) -> Result<(), SessionError> {
            if !self.connected {
                return Err(SessionError::Disconnected);
            }
            self.tx
                .send(bytes)
                .await
                .map_err(|_| SessionError::Disconnected)
        }
    }

    #[async_trait]
    impl Session for MemorySession {
        fn id(&self) -> SessionId {
            self.id
        }

        fn counterparty(&self) -> &PartyName {
            &self.counterparty
        }

        async fn send(&mut self, message: Message) -> Result<(), SessionError> {
            let bytes = Envelope::new(self.id, self.local.clone(), message).encode()?;
            self.send_raw(bytes).await
        }

        async fn receive(&mut self) -> Result<Message, SessionError> {
            if !self.connected {
                return Err(SessionError::Disconnected);
            }

            let bytes = self.rx.recv().await.ok_or(SessionError::Disconnected)?;
            let envelope = Envelope::decode(&bytes)?;

            if envelope.session_id != self.id || envelope.sender != self.counterparty {
                return Err(SessionError::Malformed(format!(
                    "envelope for session {} from {} arrived on session {}",
                    envelope.session_id, envelope.sender, self.id
                )));
            }

            Ok(envelope.body)
        }

        async fn close(&mut self) {
            self.connected = false;
            self.rx.close();
        }
    }

    /// Every party's registered handlers, keyed by (party, flow).
    #[derive(Default)]
    pub struct InMemoryNetwork {
        handlers: DashMap<(PartyName, FlowType), mpsc::Sender<IncomingSession>>,
        opened: AtomicU64,
    }

    impl InMemoryNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of sessions successfully opened so far.
        pub fn sessions_opened(&self) -> u64 {
            self.opened.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl SessionTransport for InMemoryNetwork {
        fn register(&self, party: &PartyName, flow: FlowType) -> mpsc::Receiver<IncomingSession> {
            let (tx, rx) = mpsc::channel(HANDLER_BACKLOG);
            debug!(party = %party, flow = %flow, "Registered flow handler");
            self.handlers.insert((party.clone(), flow), tx);
            rx
        }

        fn deregister(&self, party: &PartyName, flow: FlowType) {
            self.handlers.remove(&(party.clone(), flow));
            debug!(party = %party, flow = %flow, "Deregistered flow handler");
        }

        async fn open(
            &self,
            from: &PartyName,
            to: &PartyName,
            flow: FlowType,
        ) -> Result<Box<dyn Session>, SessionError> {
            let handler = self
                .handlers
                .get(&(to.clone(), flow))
                .map(|entry| entry.value().clone())
                .ok_or_else(|| SessionError::NoHandler {
                    party: to.clone(),
                    flow: flow.to_string(),
                })?;

            let (ours, theirs) = session_pair(from.clone(), to.clone());
            let session_id = ours.id;

            handler
                .send(IncomingSession {
                    initiator: from.clone(),
                    flow,
                    session: Box::new(theirs),
                })
                .await
                .map_err(|_| SessionError::Disconnected)?;

            self.opened.fetch_add(1, Ordering::Relaxed);
            debug!(%session_id, from = %from, to = %to, flow = %flow, "Session opened");

            Ok(Box::new(ours))
        }
    }
}
