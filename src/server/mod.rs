//! Relay Server
//!
//! The event loop and the broadcaster it drives.
//!
//! ## Modules
//!
//! - `event_loop`: `Server`, which owns the listener and the registry
//! - `broadcast`: `Broadcaster`, fan-out of one line to all but one client
//!
//! ## Example
//!
//! ```no_run
//! use linerelay::{Config, Server};
//!
//! # async fn start() -> Result<(), linerelay::ServerError> {
//! let config = Config::from_args(vec!["8080".to_string()]).unwrap();
//! let server = Server::bind(&config).await?;
//!
//! // Runs until Ctrl+C
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod event_loop;

pub use broadcast::{Broadcaster, Delivery};
pub use event_loop::{Server, ServerError};
