//! Connection I/O Tasks
//!
//! Every admitted client gets two small tasks. Neither touches shared state;
//! they only move bytes between the socket and the event loop.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects, event loop admits it
//!        │
//!        ▼
//! 2. spawn_connection() splits the stream
//!        │
//!        ├──────────────────────────────┐
//!        ▼                              ▼
//! 3. ┌──────────────────────┐   ┌──────────────────────┐
//!    │ Reader task          │   │ Writer task          │
//!    │                      │   │                      │
//!    │ read bytes           │   │ recv queued Bytes    │
//!    │   → Event::Data      │   │   → write_all        │
//!    │ EOF / error          │   │ write error          │
//!    │   → Event::Closed    │   │   → Event::Closed    │
//!    └──────────────────────┘   └──────────────────────┘
//!        │
//!        ▼
//! 4. Event loop evicts the connection, dropping its ConnectionLink:
//!    both tasks are aborted and the socket is closed
//! ```
//!
//! ## Ordering
//!
//! A reader task sends its events in the order it read the bytes, and a
//! single channel carries every event to the loop, so the lines of one
//! client are relayed in the order they were typed.
//!
//! ## Writes
//!
//! Outbound messages are queued on a bounded channel and written with
//! `write_all`, so partial writes are retried and a slow client only delays
//! itself, never the event loop. The event loop never waits for queue space:
//! a client whose queue is full has stopped reading, and the send fails with
//! [`ConnectionError::Backlogged`] so the client can be dropped.

use crate::connection::registry::ConnectionKey;
use crate::protocol::FrameError;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 4096;

/// Events that may wait for the event loop
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections admitted
    pub connections_accepted: AtomicU64,
    /// Connections turned away because the registry was full
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total chat lines relayed
    pub lines_relayed: AtomicU64,
    /// Total messages queued to recipients (one per recipient per broadcast)
    pub deliveries: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Records that `count` connections were dropped at once.
    pub fn connections_closed(&self, count: usize) {
        self.active_connections
            .fetch_sub(count as u64, Ordering::Relaxed);
    }

    pub fn line_relayed(&self) {
        self.lines_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deliveries_queued(&self, count: usize) {
        self.deliveries.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Why a connection is going away.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client sent a line past the length limit
    #[error("Frame error: {0}")]
    FrameError(#[from] FrameError),

    /// The writer task is gone, so nothing more can be delivered
    #[error("Writer closed")]
    WriterClosed,

    /// The client stopped reading and its outbound queue is full
    #[error("Outbound queue full ({capacity} messages)")]
    Backlogged { capacity: usize },
}

impl ConnectionError {
    /// Returns true for the ordinary ways a client leaves.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::ClientDisconnected => true,
            ConnectionError::IoError(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// What an I/O task reports to the event loop.
#[derive(Debug)]
pub enum Event {
    /// Bytes arrived from the client
    Data { key: ConnectionKey, bytes: Bytes },

    /// The connection can no longer be used
    Closed {
        key: ConnectionKey,
        error: ConnectionError,
    },
}

impl Event {
    pub fn key(&self) -> ConnectionKey {
        match self {
            Event::Data { key, .. } | Event::Closed { key, .. } => *key,
        }
    }
}

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

/// Creates the channel every I/O task reports on.
///
/// Readers wait for space, so a client that outpaces the event loop is
/// throttled by its own socket instead of growing this queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_QUEUE_DEPTH)
}

/// The event loop's end of a connection's I/O tasks.
///
/// Dropping the link closes the connection: both tasks are aborted, so an
/// evicted client never holds on to its socket waiting for a write.
#[derive(Debug)]
pub struct ConnectionLink {
    outbound: mpsc::Sender<Bytes>,
    tasks: Vec<AbortHandle>,
}

impl ConnectionLink {
    pub fn new(outbound: mpsc::Sender<Bytes>, tasks: Vec<AbortHandle>) -> Self {
        Self { outbound, tasks }
    }

    /// A link with no tasks behind it.
    #[cfg(test)]
    pub(crate) fn detached(outbound: mpsc::Sender<Bytes>) -> Self {
        Self::new(outbound, Vec::new())
    }

    /// Queues `payload` for the writer task without waiting.
    pub fn send(&self, payload: Bytes) -> Result<(), ConnectionError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionError::Backlogged {
                capacity: self.outbound.max_capacity(),
            },
            TrySendError::Closed(_) => ConnectionError::WriterClosed,
        })
    }
}

impl Drop for ConnectionLink {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Starts the reader and writer tasks for an admitted connection.
///
/// At most `queue_depth` messages wait for the writer at any time.
pub fn spawn_connection(
    stream: TcpStream,
    key: ConnectionKey,
    queue_depth: usize,
    events: EventSender,
    stats: Arc<ConnectionStats>,
) -> ConnectionLink {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client = %key.id, error = %e, "Failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(queue_depth);

    let writer_events = events.clone();
    let writer_stats = Arc::clone(&stats);
    let writer = tokio::spawn(async move {
        if let Err(error) = write_loop(write_half, outbound_rx, &writer_stats).await {
            debug!(client = %key.id, error = %error, "Writer stopped");
            // The loop may already have evicted this client
            let _ = writer_events.send(Event::Closed { key, error }).await;
        }
    });

    let reader = tokio::spawn(read_loop(read_half, key, events, stats));

    ConnectionLink::new(outbound_tx, vec![reader.abort_handle(), writer.abort_handle()])
}

/// Reads from the client until EOF or error, forwarding everything to the loop.
pub async fn read_loop<R>(
    mut reader: R,
    key: ConnectionKey,
    events: EventSender,
    stats: Arc<ConnectionStats>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_CHUNK_SIZE);

    loop {
        buffer.reserve(READ_CHUNK_SIZE);

        let error = match reader.read_buf(&mut buffer).await {
            Ok(0) => ConnectionError::ClientDisconnected,
            Ok(n) => {
                stats.bytes_read(n);
                trace!(client = %key.id, bytes = n, "Read data");

                let bytes = buffer.split().freeze();
                if events.send(Event::Data { key, bytes }).await.is_err() {
                    // Event loop is gone
                    return;
                }
                continue;
            }
            Err(e) => ConnectionError::IoError(e),
        };

        let _ = events.send(Event::Closed { key, error }).await;
        return;
    }
}

/// Writes queued messages to the client until the queue is closed.
pub async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::Receiver<Bytes>,
    stats: &ConnectionStats,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(payload) = outbound.recv().await {
        writer.write_all(&payload).await?;
        stats.bytes_written(payload.len());
    }

    writer.shutdown().await?;
    Ok(())
}
