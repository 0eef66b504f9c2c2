//! Connection Registry
//!
//! The registry owns the state of every admitted client: its identity, its
//! framer (pending receive buffer) and the link to its I/O tasks. It is owned
//! by the event loop alone, so nothing in here is locked.
//!
//! ## Handles vs. Identities
//!
//! ```text
//!   ConnectionHandle   slot number, lowest free slot first, reused after
//!                      eviction (like an OS file descriptor)
//!   ClientId           0, 1, 2, ... in admission order, never reused
//! ```
//!
//! Handles order iteration, identities name clients in announcements. An
//! event from an I/O task carries both (a [`ConnectionKey`]), so an event
//! from an evicted connection can never be mistaken for one from a newer
//! connection that landed in the same slot.

use crate::connection::handler::{ConnectionError, ConnectionLink};
use crate::protocol::{LineFramer, Lines};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Slot number of an active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionHandle(usize);

impl ConnectionHandle {
    /// Returns the slot number.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-lifetime-unique client identity, assigned at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl ClientId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle plus identity: names exactly one admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub handle: ConnectionHandle,
    pub id: ClientId,
}

/// Errors returned by the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is taken
    #[error("connection limit reached ({capacity} clients)")]
    Full { capacity: usize },
}

/// One admitted client.
#[derive(Debug)]
pub struct Connection {
    key: ConnectionKey,
    addr: SocketAddr,
    framer: LineFramer,
    link: ConnectionLink,
}

impl Connection {
    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    pub fn id(&self) -> ClientId {
        self.key.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the bytes received but not yet forming a complete line.
    pub fn pending(&self) -> &[u8] {
        self.framer.pending()
    }

    /// Feeds freshly read bytes through this connection's framer.
    pub fn feed(&mut self, data: &[u8]) -> Lines<'_> {
        self.framer.feed(data)
    }

    /// Queues `payload` for delivery to this client.
    ///
    /// Fails if the client's writer task is gone or its queue is full.
    pub fn send(&self, payload: Bytes) -> Result<(), ConnectionError> {
        self.link.send(payload)
    }
}

/// The set of active connections, keyed by handle.
#[derive(Debug)]
pub struct Registry {
    /// Active connections in ascending handle order
    connections: BTreeMap<ConnectionHandle, Connection>,

    /// Slots freed by eviction, handed out lowest first
    free_slots: BTreeSet<usize>,

    /// First never-used slot
    next_slot: usize,

    /// Next identity to assign
    next_id: u64,

    /// Maximum number of simultaneous connections
    capacity: usize,

    /// Line length limit for new connections' framers
    max_line_length: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry with the default limits.
    pub fn new() -> Self {
        Self::with_limits(crate::DEFAULT_MAX_CONNECTIONS, crate::DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_limits(capacity: usize, max_line_length: usize) -> Self {
        Self {
            connections: BTreeMap::new(),
            free_slots: BTreeSet::new(),
            next_slot: 0,
            next_id: 0,
            capacity,
            max_line_length,
        }
    }

    /// Admits a new connection.
    ///
    /// `open` is called with the key assigned to the connection and must
    /// return the link to its I/O tasks. When the registry is full `open` is
    /// never called and no identity is consumed.
    pub fn admit<F>(&mut self, addr: SocketAddr, open: F) -> Result<ConnectionKey, RegistryError>
    where
        F: FnOnce(ConnectionKey) -> ConnectionLink,
    {
        if self.is_full() {
            return Err(RegistryError::Full {
                capacity: self.capacity,
            });
        }

        let slot = match self.free_slots.pop_first() {
            Some(slot) => slot,
            None => {
                self.next_slot += 1;
                self.next_slot - 1
            }
        };

        let key = ConnectionKey {
            handle: ConnectionHandle(slot),
            id: ClientId(self.next_id),
        };
        self.next_id += 1;

        let connection = Connection {
            key,
            addr,
            framer: LineFramer::with_limit(self.max_line_length),
            link: open(key),
        };
        self.connections.insert(key.handle, connection);

        Ok(key)
    }

    /// Removes a connection, closing its I/O tasks.
    ///
    /// Evicting a handle that is not active is a no-op.
    pub fn evict(&mut self, handle: ConnectionHandle) -> Option<Connection> {
        let connection = self.connections.remove(&handle)?;
        self.free_slots.insert(handle.0);
        Some(connection)
    }

    /// Evicts every connection at once.
    pub fn clear(&mut self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        self.free_slots.clear();
        self.next_slot = 0;
        count
    }

    /// Iterates active handles in ascending order, skipping `excluded`.
    pub fn active_except(
        &self,
        excluded: ConnectionHandle,
    ) -> impl Iterator<Item = ConnectionHandle> + '_ {
        self.connections
            .keys()
            .copied()
            .filter(move |&handle| handle != excluded)
    }

    /// Looks up the connection occupying `handle`.
    pub fn get(&self, handle: ConnectionHandle) -> Option<&Connection> {
        self.connections.get(&handle)
    }

    /// Looks up the connection named by `key`.
    ///
    /// Returns `None` if the slot was since reused by a newer admission.
    pub fn get_mut(&mut self, key: ConnectionKey) -> Option<&mut Connection> {
        self.connections
            .get_mut(&key.handle)
            .filter(|connection| connection.key.id == key.id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.capacity
    }
}
