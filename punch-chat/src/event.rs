//! Events consumed by the session loop.
//!
//! Background producers never touch session state; they describe what
//! happened with one of these values and push it onto a channel.

use std::net::SocketAddr;
use std::time::Instant;

use chrono::{DateTime, Local};

/// A classified inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// The peer's `ping` arrived: the NAT mapping is open right now.
    Keepalive {
        /// Monotonic receive time, used by the delivery-confidence window.
        received_at: Instant,
        from: SocketAddr,
    },
    /// Anything else: chat text or a discovery reply.
    Data {
        /// Wall-clock receive time; becomes the message timestamp.
        timestamp: DateTime<Local>,
        from: SocketAddr,
        text: String,
    },
}

/// One unit of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    /// Move the selection towards older messages.
    SelectUp,
    /// Move the selection towards newer messages (and past the end).
    SelectDown,
    /// Enter: copy the hovered message or submit the input line.
    Confirm,
    /// Insert a character at the caret.
    Char(char),
    Backspace,
    Delete,
    CaretLeft,
    CaretRight,
    CaretHome,
    CaretEnd,
    /// A whole line typed in plain mode: replaces the buffer, then confirms.
    Line(String),
    /// Ctrl-C / Esc.
    Interrupt,
    /// The input source is exhausted (stdin EOF).
    EndOfInput,
}
