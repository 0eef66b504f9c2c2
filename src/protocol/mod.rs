//! Line Relay Protocol
//!
//! The wire protocol is plain text over TCP with `\n` as the only delimiter.
//! No handshake, no length prefixes, no escaping. Bytes are relayed as-is,
//! so UTF-8 is welcome but not required.
//!
//! ## Modules
//!
//! - `framer`: Turns a connection's byte stream into complete lines
//! - `notice`: The fixed line formats the server writes to clients
//!
//! ## Example
//!
//! ```
//! use linerelay::connection::ClientId;
//! use linerelay::protocol::{LineFramer, Notice};
//!
//! # fn main() -> Result<(), linerelay::protocol::FrameError> {
//! let mut framer = LineFramer::new();
//! for line in framer.feed(b"hello\n") {
//!     let notice = Notice::Chat { from: ClientId::new(0), line: line? };
//!     assert_eq!(&notice.serialize()[..], b"client 0: hello\n");
//! }
//! # Ok(())
//! # }
//! ```

pub mod framer;
pub mod notice;

// Re-export commonly used types for convenience
pub use framer::{FrameError, LineFramer, Lines, NEWLINE};
pub use notice::Notice;
