//! Connected clients and broadcast fan-out.
//!
//! A [`Connection`] is one open WebSocket session: an id, the privilege it
//! was granted at handshake, and a [`ConnectionSink`] that queues outbound
//! text frames.  The [`ConnectionSet`] is exactly the set of currently open
//! connections.
//!
//! # Why is `send` synchronous? (for beginners)
//!
//! Broadcasting happens while the router is handling a message.  If writing
//! to one slow browser could block, every other client would wait behind it.
//! Instead each session owns a bounded queue; `send` only *enqueues* (like
//! `tokio::sync::mpsc::Sender::try_send`) and fails immediately when the queue
//! is full or the session is gone.  A dedicated writer task per session
//! drains the queue onto the socket.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use mission_core::{Envelope, Privilege};

/// Unique identifier of an open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors a sink reports when a frame cannot be queued.
#[derive(Debug, Error, PartialEq)]
pub enum SendError {
    /// The outbound queue is at capacity (slow reader).
    #[error("outbound queue full")]
    Full,

    /// The session has ended.
    #[error("connection closed")]
    Closed,
}

/// Non-blocking outbound queue of one connection.
pub trait ConnectionSink: Send + Sync {
    /// Enqueues one text frame without waiting.
    fn send(&self, text: Arc<str>) -> Result<(), SendError>;
}

/// One open client session.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    privilege: Privilege,
    sink: Arc<dyn ConnectionSink>,
}

impl Connection {
    pub fn new(privilege: Privilege, sink: Arc<dyn ConnectionSink>) -> Self {
        Self {
            id: ConnectionId::new(),
            privilege,
            sink,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn privilege(&self) -> Privilege {
        self.privilege
    }

    /// Queues an already-encoded frame.
    pub fn send_text(&self, text: Arc<str>) -> Result<(), SendError> {
        self.sink.send(text)
    }

    /// Encodes and queues a single envelope for this connection only.
    pub fn send_envelope(&self, envelope: &Envelope) {
        match envelope.to_json() {
            Ok(text) => {
                if let Err(e) = self.sink.send(Arc::from(text)) {
                    debug!(connection = %self.id, "send failed: {e}");
                }
            }
            Err(e) => warn!("dropping outbound envelope: {e}"),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("privilege", &self.privilege)
            .finish_non_exhaustive()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// The set of open connections.
///
/// Shared (`Arc<ConnectionSet>`) between the dispatch timeline and mode
/// broadcasters, so membership sits behind a `RwLock`.  Broadcasts take a
/// read lock only long enough to clone the recipient list.
#[derive(Default)]
pub struct ConnectionSet {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: Connection) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.id(), connection);
    }

    pub fn remove(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends `envelope` to every open connection, or only to those in
    /// `only_to` when given.
    ///
    /// The envelope is serialised once.  A failing connection is logged and
    /// skipped; it never stops delivery to the others.
    pub fn broadcast(
        &self,
        envelope: &Envelope,
        only_to: Option<&HashSet<ConnectionId>>,
    ) -> BroadcastReport {
        let text: Arc<str> = match envelope.to_json() {
            Ok(t) => Arc::from(t),
            Err(e) => {
                warn!("dropping broadcast on channel {}: {e}", envelope.channel);
                return BroadcastReport::default();
            }
        };

        let recipients: Vec<Connection> = {
            let guard = self.connections.read().unwrap_or_else(PoisonError::into_inner);
            guard
                .values()
                .filter(|c| only_to.map_or(true, |set| set.contains(&c.id())))
                .cloned()
                .collect()
        };

        let mut report = BroadcastReport::default();
        for connection in recipients {
            match connection.send_text(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(connection = %connection.id(), "broadcast write failed: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
