//! Incremental Line Framer
//!
//! TCP hands us a byte stream, not messages. A client may deliver half a line
//! in one read and three and a half lines in the next. The framer keeps the
//! not-yet-terminated tail of the stream for each connection and carves off
//! every complete line as soon as its `\n` arrives.
//!
//! ## How Framing Works
//!
//! ```text
//!   feed("ab")       pending: "ab"             emits: (nothing)
//!   feed("cd\nef")   pending: "abcd\nef"
//!                    split at first '\n'  ───> emits: "abcd\n"
//!                    pending: "ef"
//!   feed("\n\n")     pending: "ef\n\n"    ───> emits: "ef\n", "\n"
//!                    pending: ""
//! ```
//!
//! The delimiter stays attached to the emitted line. Splitting the stream into
//! different chunks never changes the sequence of lines that comes out.
//!
//! ## Buffer Management
//!
//! Pending bytes live in a `BytesMut`. Appending is amortized, and carving a
//! line off the front is a `split_to`, which hands the line out as `Bytes`
//! without copying it.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// The one and only line delimiter.
pub const NEWLINE: u8 = b'\n';

/// Errors that can occur while framing a connection's byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A line is longer than the configured limit
    #[error("line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },
}

/// Splits one connection's byte stream into newline-terminated lines.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use linerelay::protocol::LineFramer;
///
/// let mut framer = LineFramer::new();
///
/// assert_eq!(framer.feed(b"he").count(), 0);
///
/// let lines: Result<Vec<_>, _> = framer.feed(b"llo\nwor").collect();
/// assert_eq!(lines.unwrap(), vec![Bytes::from_static(b"hello\n")]);
/// assert_eq!(framer.pending(), b"wor");
/// ```
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes received but not yet part of a complete line
    pending: BytesMut,

    /// Prefix of `pending` already known to hold no newline
    scanned: usize,

    /// Longest line (delimiter excluded) this framer accepts
    max_line_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    /// Creates a framer with the default line length limit.
    pub fn new() -> Self {
        Self::with_limit(crate::DEFAULT_MAX_LINE_LENGTH)
    }

    /// Creates a framer that rejects lines longer than `max_line_length` bytes.
    pub fn with_limit(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            scanned: 0,
            max_line_length,
        }
    }

    /// Appends `data` to the pending buffer and returns the complete lines.
    ///
    /// The returned iterator carves lines off the buffer as it is advanced.
    /// Lines it does not get to stay buffered and come out of the next call,
    /// so dropping it early loses nothing.
    ///
    /// Every line ahead of an over-long one is yielded first. The over-long
    /// line yields `Err(FrameError::LineTooLong)`, discards the buffer and
    /// ends the sequence. A line with
    /// no newline yet fails as soon as its pending part exceeds the limit,
    /// so the outcome does not depend on how the stream was chunked.
    pub fn feed(&mut self, data: &[u8]) -> Lines<'_> {
        self.pending.extend_from_slice(data);
        Lines { framer: self }
    }

    /// Returns the bytes waiting for a newline.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn reject(&mut self, size: usize) -> FrameError {
        self.pending.clear();
        self.scanned = 0;
        FrameError::LineTooLong {
            size,
            max: self.max_line_length,
        }
    }
}

/// Lazy sequence of complete lines produced by [`LineFramer::feed`].
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = Result<Bytes, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let framer = &mut *self.framer;

        // Only bytes not seen by an earlier call are searched
        let found = framer.pending[framer.scanned..]
            .iter()
            .position(|&b| b == NEWLINE)
            .map(|offset| framer.scanned + offset);

        match found {
            Some(pos) if pos > framer.max_line_length => Some(Err(framer.reject(pos))),
            Some(pos) => {
                framer.scanned = 0;
                Some(Ok(framer.pending.split_to(pos + 1).freeze()))
            }
            None => {
                let len = framer.pending.len();
                framer.scanned = len;
                (len > framer.max_line_length).then(|| Err(framer.reject(len)))
            }
        }
    }
}
