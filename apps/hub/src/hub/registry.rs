//! Connection registry - who is reachable right now.
//!
//! A [`Session`] is one open socket. It becomes a [`Connection`] once its
//! peer has signed up, and stops being one when the socket closes. The
//! dispatch loop only ever addresses connections listed here.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hubwire::HubMessage;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

/// Identifier of one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Transport-side handle for one open socket
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    outbound: mpsc::Sender<HubMessage>,
}

impl Session {
    /// Create a session with a bounded send queue, returning the receiving
    /// end for the socket writer
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<HubMessage>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (Self { id: ConnectionId::next(), outbound }, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn outbound(&self) -> &mpsc::Sender<HubMessage> {
        &self.outbound
    }
}

/// A signed-up validator bound to a live session
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub validator_id: String,
    pub public_key: String,
    pub outbound: mpsc::Sender<HubMessage>,
    pub admitted_at: Instant,
}

impl Connection {
    pub fn new(session: &Session, validator_id: String, public_key: String) -> Self {
        Self {
            connection_id: session.id(),
            validator_id,
            public_key,
            outbound: session.outbound().clone(),
            admitted_at: Instant::now(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0} already has a signed-up validator")]
    AlreadyRegistered(ConnectionId),
}

#[derive(Default)]
struct RegistryInner {
    by_connection: HashMap<ConnectionId, Connection>,
    by_validator: HashMap<String, ConnectionId>,
}

/// Live validator connections, keyed by session
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a connection.
    ///
    /// A session holds at most one connection. If the validator is already
    /// connected on another session, that older entry is replaced and
    /// returned. The last session to sign up wins, so a replaced session
    /// that signs up again takes the validator back.
    pub async fn add(&self, connection: Connection) -> Result<Option<Connection>, RegistryError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        if inner.by_connection.contains_key(&connection.connection_id) {
            return Err(RegistryError::AlreadyRegistered(connection.connection_id));
        }

        let replaced = inner
            .by_validator
            .insert(connection.validator_id.clone(), connection.connection_id)
            .and_then(|previous| inner.by_connection.remove(&previous));

        inner.by_connection.insert(connection.connection_id, connection);
        Ok(replaced)
    }

    /// Forget the connection of a closed session. No-op if it was never
    /// admitted or was already removed.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<Connection> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let removed = inner.by_connection.remove(&connection_id)?;
        if inner.by_validator.get(&removed.validator_id) == Some(&connection_id) {
            inner.by_validator.remove(&removed.validator_id);
        }
        Some(removed)
    }

    /// Snapshot of every admitted connection, oldest session first
    pub async fn list_active(&self) -> Vec<Connection> {
        let inner = self.inner.read().await;
        let mut connections: Vec<Connection> = inner.by_connection.values().cloned().collect();
        connections.sort_by_key(|c| c.connection_id);
        connections
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        self.inner.read().await.by_connection.contains_key(&connection_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_connection.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
