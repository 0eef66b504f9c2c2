//! # LineRelay - A Single-Process TCP Line Relay
//!
//! Clients connect over TCP and send newline-terminated lines. Every complete
//! line is rebroadcast to all other connected clients, prefixed with the
//! sender's identity, and arrivals and departures are announced.
//!
//! It is meant for a trusted local network: no authentication, no
//! encryption, no persistence, no rooms.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              LineRelay                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │ TCP Server  │───>│                Event Loop                    │   │
//! │  │ (Listener)  │    │                                              │   │
//! │  └─────────────┘    │  ┌──────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │                     │  │ Registry │─>│ LineFramer │─>│Broadcast │  │   │
//! │  ┌─────────────┐    │  └──────────┘  └────────────┘  └────┬─────┘  │   │
//! │  │Reader tasks │───>│                                     │        │   │
//! │  └─────────────┘    └─────────────────────────────────────┼────────┘   │
//! │                                                           ▼            │
//! │                                                  ┌─────────────────┐   │
//! │                                                  │  Writer tasks   │   │
//! │                                                  └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use linerelay::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_args(std::env::args().skip(1))?;
//!     let server = Server::bind(&config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! Plain text, `\n` as the only delimiter:
//!
//! ```text
//! server: client 1 just arrived
//! client 0: hello
//! server: client 1 just left
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Command-line configuration
//! - [`protocol`]: Line framing and the server's line formats
//! - [`connection`]: Connection registry and per-connection I/O tasks
//! - [`server`]: The event loop and broadcast fan-out
//!
//! ## Design Highlights
//!
//! ### Single Owner
//!
//! All per-client state is owned by one task, the event loop. I/O tasks talk
//! to it over channels, so there are no locks around the registry.
//!
//! ### Fault Isolation
//!
//! A client that cannot be written to is dropped on its own. Everyone else
//! still receives the broadcast.
//!
//! ### Bounded Resources
//!
//! The number of clients, the length of a line and the number of messages
//! waiting for each client are all capped. A line past the cap is a protocol
//! violation and disconnects its sender. A client that lets its queue fill
//! up is disconnected like one whose socket failed.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigError};
pub use connection::{ClientId, ConnectionStats, Registry};
pub use protocol::{FrameError, LineFramer, Notice};
pub use server::{Broadcaster, Server, ServerError};

/// The address the relay binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Maximum number of simultaneous clients
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Longest line a client may send (64 KB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Messages that may wait for one client's writer before it is dropped
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

/// Version of LineRelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
