//! Connection Management Module
//!
//! This module tracks connected clients and moves bytes between their sockets
//! and the event loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Loop (server)                     │
//! │                                                             │
//! │   ┌──────────────────────────────────────────────────────┐  │
//! │   │ Registry                                             │  │
//! │   │  #0 ─ client 0 ─ LineFramer ─ ConnectionLink         │  │
//! │   │  #1 ─ client 3 ─ LineFramer ─ ConnectionLink         │  │
//! │   │  #2 ─ client 2 ─ LineFramer ─ ConnectionLink         │  │
//! │   └──────────────────────────────────────────────────────┘  │
//! └──────────────▲──────────────────────────────┬───────────────┘
//!                │ Event (mpsc)                  │ Bytes (mpsc)
//!       ┌────────┴────────┐             ┌────────▼────────┐
//!       │  Reader tasks   │             │  Writer tasks   │
//!       └────────▲────────┘             └────────┬────────┘
//!                │            TCP                ▼
//! ```
//!
//! ## Features
//!
//! - **Single owner**: All per-client state lives in the registry, owned by the loop
//! - **Stable naming**: Identities are never reused, handles are
//! - **Isolated writes**: Each client has its own outbound queue and writer
//! - **Statistics**: Tracks connection and traffic metrics

pub mod handler;
pub mod registry;

// Re-export commonly used types
pub use handler::{
    event_channel, spawn_connection, ConnectionError, ConnectionLink, ConnectionStats, Event,
    EventReceiver, EventSender,
};
pub use registry::{
    ClientId, Connection, ConnectionHandle, ConnectionKey, Registry, RegistryError,
};
