//! Wire-format definitions for chat datagrams.
//!
//! Every UDP datagram is one logical unit of plaintext.  There is no header,
//! length prefix, or fragmentation handling.  A handful of payloads are
//! reserved for control traffic; everything else is chat:
//!
//! | Payload         | Meaning                                             |
//! |-----------------|-----------------------------------------------------|
//! | `ping`          | keep-alive / hole-punch sentinel, never rendered    |
//! | `whoami`        | discovery query, sent to the discovery host only    |
//! | `addr:<value>`  | discovery reply carrying our external address       |
//! | anything else   | free-text chat, rendered verbatim                   |
//!
//! No I/O happens here; this is pure classification and parsing.

use std::net::SocketAddr;

/// Keep-alive sentinel sent by the puncher on every tick.
pub const PING: &str = "ping";

/// Discovery query payload.
pub const WHOAMI: &str = "whoami";

/// Prefix of a discovery reply.
pub const ADDR_PREFIX: &str = "addr:";

/// Receive buffer size; longer datagrams are truncated by the OS.
pub const MAX_DATAGRAM: usize = 1024;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// The two kinds of inbound traffic the listener distinguishes.
///
/// Discovery replies and chat text share the [`Payload::Data`] variant; the
/// session tells them apart by content (see [`DiscoveryReply::parse`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Exactly [`PING`].
    Keepalive,
    /// Any other payload, decoded lossily as UTF-8.
    Data(String),
}

impl Payload {
    /// Classify a raw datagram.
    ///
    /// Only an exact byte match counts as a keep-alive: `"ping "` or
    /// `"PING"` are chat.
    pub fn classify(bytes: &[u8]) -> Self {
        if bytes == PING.as_bytes() {
            Self::Keepalive
        } else {
            Self::Data(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// Discovery replies
// ---------------------------------------------------------------------------

/// A decoded `addr:` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryReply {
    /// The suffix parsed as `ip:port`.
    Address(SocketAddr),
    /// The suffix did not parse; carried verbatim (possibly empty).
    Raw(String),
}

impl DiscoveryReply {
    /// Returns `None` when `text` is not a discovery reply at all.
    pub fn parse(text: &str) -> Option<Self> {
        let suffix = text.strip_prefix(ADDR_PREFIX)?;
        let trimmed = suffix.trim();
        Some(match trimmed.parse::<SocketAddr>() {
            Ok(addr) => Self::Address(addr),
            Err(_) => Self::Raw(trimmed.to_string()),
        })
    }

    /// Text shown in the timeline for this reply.
    pub fn display_text(&self) -> String {
        match self {
            Self::Address(addr) => addr.to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}
