//! Relay Line Formats
//!
//! Everything the server writes to a client is one of three fixed line shapes:
//!
//! - Arrival: `server: client <id> just arrived\n`
//! - Departure: `server: client <id> just left\n`
//! - Chat: `client <id>: <line>` where `<line>` still carries its own `\n`
//!
//! There is no client-to-server control channel. A client that sends a line
//! looking like `server: client 7 just left` simply gets it relayed as chat.

use crate::connection::ClientId;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// A line the server sends to connected clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A client was admitted
    Arrived(ClientId),

    /// A client disconnected or was dropped
    Left(ClientId),

    /// A complete line from a client, delimiter included
    Chat { from: ClientId, line: Bytes },
}

impl Notice {
    /// Serializes the notice into its wire form.
    ///
    /// # Example
    /// ```
    /// use linerelay::protocol::Notice;
    /// use linerelay::connection::ClientId;
    ///
    /// let notice = Notice::Arrived(ClientId::new(3));
    /// assert_eq!(&notice.serialize()[..], b"server: client 3 just arrived\n");
    /// ```
    pub fn serialize(&self) -> Bytes {
        match self {
            Notice::Arrived(id) => Bytes::from(format!("server: client {} just arrived\n", id)),
            Notice::Left(id) => Bytes::from(format!("server: client {} just left\n", id)),
            Notice::Chat { from, line } => {
                let prefix = format!("client {}: ", from);
                let mut buf = BytesMut::with_capacity(prefix.len() + line.len());
                buf.put_slice(prefix.as_bytes());
                buf.put_slice(line);
                buf.freeze()
            }
        }
    }

    /// Returns the client this notice is about.
    pub fn client(&self) -> ClientId {
        match self {
            Notice::Arrived(id) | Notice::Left(id) => *id,
            Notice::Chat { from, .. } => *from,
        }
    }
}

/// Human-readable form for logs: the wire text without its trailing newline.
impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = self.serialize();
        let text = String::from_utf8_lossy(&wire);
        write!(f, "{}", text.strip_suffix('\n').unwrap_or(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrival_format() {
        let notice = Notice::Arrived(ClientId::new(1));
        assert_eq!(&notice.serialize()[..], b"server: client 1 just arrived\n");
    }

    #[test]
    fn test_departure_format() {
        let notice = Notice::Left(ClientId::new(12));
        assert_eq!(&notice.serialize()[..], b"server: client 12 just left\n");
    }

    #[test]
    fn test_chat_format_keeps_single_newline() {
        let notice = Notice::Chat {
            from: ClientId::new(0),
            line: Bytes::from_static(b"hello\n"),
        };
        assert_eq!(&notice.serialize()[..], b"client 0: hello\n");
    }

    #[test]
    fn test_chat_is_byte_transparent() {
        let notice = Notice::Chat {
            from: ClientId::new(5),
            line: Bytes::from_static(&[0xc3, 0x28, b'\n']),
        };
        let mut expected = b"client 5: ".to_vec();
        expected.extend_from_slice(&[0xc3, 0x28, b'\n']);
        assert_eq!(&notice.serialize()[..], &expected[..]);
    }

    #[test]
    fn test_chat_that_looks_like_control_line() {
        let notice = Notice::Chat {
            from: ClientId::new(2),
            line: Bytes::from_static(b"server: client 9 just left\n"),
        };
        assert_eq!(
            &notice.serialize()[..],
            b"client 2: server: client 9 just left\n"
        );
    }

    #[test]
    fn test_display_strips_newline() {
        let notice = Notice::Left(ClientId::new(4));
        assert_eq!(notice.to_string(), "server: client 4 just left");
        assert_eq!(notice.client(), ClientId::new(4));
    }
}
