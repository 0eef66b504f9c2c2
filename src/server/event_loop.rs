//! The Relay Event Loop
//!
//! One task owns the listener, the registry and every connection's pending
//! buffer. It waits on three sources at once and handles whatever is ready:
//!
//! ```text
//!            ┌───────────────┐
//!   Ctrl+C ─>│               │──> evict everyone, close listener, return
//!            │               │
//!  accept ──>│  Server::run  │──> admit ──> "server: client N just arrived"
//!            │               │
//!   Event ──>│               │──> Data:   frame ──> "client N: <line>"
//!            └───────────────┘    Closed: "server: client N just left" ──> evict
//! ```
//!
//! The sources are polled in a fixed order (shutdown, accept, events) so the
//! outcome of a wakeup with several ready sources is deterministic. There is
//! no fairness guarantee under sustained load.
//!
//! ## Fault isolation
//!
//! Nothing a single client does can stop the loop. Accept failures are
//! logged and skipped. A recipient whose writer has died, or whose outbound
//! queue is full because it stopped reading, is evicted after the broadcast
//! that discovered it, with its own departure notice.

use crate::config::Config;
use crate::connection::{
    event_channel, spawn_connection, Connection, ConnectionError, ConnectionKey,
    ConnectionStats, Event, EventReceiver, EventSender, Registry,
};
use crate::protocol::Notice;
use crate::server::broadcast::Broadcaster;
use bytes::Bytes;
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::{debug, error, info, warn};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be set up
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// The relay server.
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    broadcaster: Broadcaster,
    events_tx: EventSender,
    events_rx: EventReceiver,
    stats: Arc<ConnectionStats>,

    /// Outbound queue depth for each new connection
    queue_depth: usize,

    /// Recipients a broadcast could not reach, waiting to be evicted
    faulted: VecDeque<(ConnectionKey, ConnectionError)>,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind { address, source })?;

        let stats = Arc::new(ConnectionStats::new());
        let (events_tx, events_rx) = event_channel();

        Ok(Self {
            listener,
            registry: Registry::with_limits(config.max_connections, config.max_line_length),
            broadcaster: Broadcaster::new(Arc::clone(&stats)),
            events_tx,
            events_rx,
            stats,
            queue_depth: config.max_queued_messages.max(1),
            faulted: VecDeque::new(),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns the shared statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Runs until Ctrl+C.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(e) => {
                    // Without a handler the relay just runs until killed
                    error!(error = %e, "Failed to install Ctrl+C handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        self.run_until(shutdown).await
    }

    /// Runs until `shutdown` completes, then drops every client at once.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.on_accept(stream, addr),
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },

                Some(event) = self.events_rx.recv() => self.on_event(event),
            }

            self.evict_faulted();
        }

        self.shutdown();
        Ok(())
    }

    fn on_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let events = self.events_tx.clone();
        let stats = Arc::clone(&self.stats);
        let queue_depth = self.queue_depth;

        let key = match self.registry.admit(addr, |key| {
            spawn_connection(stream, key, queue_depth, events, stats)
        }) {
            Ok(key) => key,
            Err(e) => {
                // The stream was dropped unopened, which closes it
                self.stats.connection_rejected();
                warn!(client = %addr, error = %e, "Rejected connection");
                return;
            }
        };

        self.stats.connection_opened();
        debug!(client = %key.id, handle = %key.handle, addr = %addr, "Client connected");

        self.announce(Notice::Arrived(key.id), key);
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Data { key, bytes } => self.on_data(key, bytes),
            Event::Closed { key, error } => self.disconnect(key, error),
        }
    }

    fn on_data(&mut self, key: ConnectionKey, bytes: Bytes) {
        let Some(connection) = self.registry.get_mut(key) else {
            debug!(client = %key.id, "Dropping data from evicted client");
            return;
        };

        let mut lines = Vec::new();
        let mut violation = None;
        for framed in connection.feed(&bytes) {
            match framed {
                Ok(line) => lines.push(line),
                Err(e) => {
                    violation = Some(e);
                    break;
                }
            }
        }

        // Lines that arrived ahead of an over-long one still go out
        for line in lines {
            self.stats.line_relayed();
            self.announce(Notice::Chat { from: key.id, line }, key);
        }

        if let Some(e) = violation {
            self.disconnect(key, e.into());
        }
    }

    /// Announces the departure of `key` and evicts it.
    fn disconnect(&mut self, key: ConnectionKey, reason: ConnectionError) {
        let Some(addr) = self
            .registry
            .get(key.handle)
            .filter(|connection| connection.key() == key)
            .map(Connection::addr)
        else {
            return;
        };

        if reason.is_disconnect() {
            debug!(client = %key.id, addr = %addr, reason = %reason, "Client disconnected");
        } else {
            warn!(client = %key.id, addr = %addr, reason = %reason, "Dropping client");
        }

        self.announce(Notice::Left(key.id), key);

        if self.registry.evict(key.handle).is_some() {
            self.stats.connection_closed();
        }
    }

    /// Logs `notice` and sends it to everyone except `about`.
    fn announce(&mut self, notice: Notice, about: ConnectionKey) {
        info!("{}", notice);

        let delivery = self
            .broadcaster
            .broadcast(&self.registry, &notice.serialize(), about.handle);
        self.faulted.extend(delivery.failed);
    }

    fn evict_faulted(&mut self) {
        while let Some((key, reason)) = self.faulted.pop_front() {
            self.disconnect(key, reason);
        }
    }

    /// Drops every client without departure notices and closes the listener.
    fn shutdown(mut self) {
        let dropped = self.registry.clear();
        self.stats.connections_closed(dropped);

        info!(
            clients = dropped,
            accepted = self.stats.connections_accepted.load(Ordering::Relaxed),
            rejected = self.stats.connections_rejected.load(Ordering::Relaxed),
            lines = self.stats.lines_relayed.load(Ordering::Relaxed),
            deliveries = self.stats.deliveries.load(Ordering::Relaxed),
            bytes_read = self.stats.bytes_read.load(Ordering::Relaxed),
            bytes_written = self.stats.bytes_written.load(Ordering::Relaxed),
            "Server shutdown complete"
        );
    }
}
