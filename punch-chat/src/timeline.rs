//! Ordered message timeline.
//!
//! Locally authored and peer-received messages live in two append-only
//! sequences.  After every append the merged view is rebuilt by a stable
//! timestamp sort over both; entries with equal timestamps keep their
//! insertion order.
//!
//! All three vectors sit behind one mutex, so a reader never sees an append
//! applied to one sequence but not yet to the merged view.  The session is
//! the only writer; the lock exists because rendering may overlap with the
//! next update in the host UI runtime.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who a message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    LocalUser,
    RemotePeer,
    /// Produced by the discovery exchange.
    System,
}

impl Origin {
    pub fn label(self) -> &'static str {
        match self {
            Self::LocalUser => "you",
            Self::RemotePeer => "peer",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One timeline entry.  Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: DateTime<Local>,
    pub origin: Origin,
    /// The peer for local and remote messages; the discovery host for system ones.
    pub remote: SocketAddr,
    pub text: String,
    /// Delivery-confidence flag.  Only meaningful for local messages; always
    /// `true` for received ones (they evidently arrived).
    pub delivered: bool,
}

impl Message {
    /// A message typed here and sent to `peer`.
    pub fn local(
        timestamp: DateTime<Local>,
        peer: SocketAddr,
        text: impl Into<String>,
        delivered: bool,
    ) -> Self {
        Self {
            timestamp,
            origin: Origin::LocalUser,
            remote: peer,
            text: text.into(),
            delivered,
        }
    }

    /// Chat text received from `from`.
    pub fn remote(timestamp: DateTime<Local>, from: SocketAddr, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            origin: Origin::RemotePeer,
            remote: from,
            text: text.into(),
            delivered: true,
        }
    }

    /// A discovery result attributed to the discovery host.
    pub fn system(
        timestamp: DateTime<Local>,
        discovery: SocketAddr,
        text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            origin: Origin::System,
            remote: discovery,
            text: text.into(),
            delivered: true,
        }
    }
}

/// Was the NAT mapping observed open recently enough at `now`?
///
/// `true` iff a keep-alive was seen and `now - last_keepalive <= window`.
/// This is a liveness estimate, not an acknowledgement of any message.
pub fn delivery_confidence(now: Instant, last_keepalive: Option<Instant>, window: Duration) -> bool {
    match last_keepalive {
        Some(seen) => now.saturating_duration_since(seen) <= window,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Timeline
// ---------------------------------------------------------------------------

/// Thread-safe timeline handle.  Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    inner: Arc<Mutex<TimelineInner>>,
}

#[derive(Debug, Default)]
struct TimelineInner {
    local: Vec<(u64, Message)>,
    remote: Vec<(u64, Message)>,
    merged: Vec<Message>,
    /// Total appends; doubles as the insertion sequence number.
    appended: u64,
}

impl TimelineInner {
    fn push(&mut self, origin_local: bool, message: Message) -> usize {
        let seq = self.appended;
        self.appended += 1;
        if origin_local {
            self.local.push((seq, message));
        } else {
            self.remote.push((seq, message));
        }
        self.rebuild();
        self.merged.len()
    }

    fn rebuild(&mut self) {
        let mut all: Vec<&(u64, Message)> = self.local.iter().chain(self.remote.iter()).collect();
        all.sort_by_key(|(seq, m)| (m.timestamp, *seq));
        self.merged = all.into_iter().map(|(_, m)| m.clone()).collect();
    }

    fn last_appended(&self) -> Option<&Message> {
        let local = self.local.last();
        let remote = self.remote.last();
        match (local, remote) {
            (Some(l), Some(r)) => Some(if l.0 > r.0 { &l.1 } else { &r.1 }),
            (Some(l), None) => Some(&l.1),
            (None, Some(r)) => Some(&r.1),
            (None, None) => None,
        }
    }
}

/// A consistent copy of the timeline, taken under one lock acquisition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineSnapshot {
    pub messages: Vec<Message>,
    /// Number of appends so far (local + remote).
    pub appended: u64,
    /// Most recently appended message, regardless of where it sorted.
    pub last_appended: Option<Message>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TimelineInner> {
        // Appends are applied in full before the guard drops, so a poisoned
        // store is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the local sequence; returns the merged length.
    pub fn append_local(&self, message: Message) -> usize {
        self.lock().push(true, message)
    }

    /// Append to the remote sequence (peer and system messages); returns the
    /// merged length.
    pub fn append_remote(&self, message: Message) -> usize {
        self.lock().push(false, message)
    }

    /// Merged length.
    pub fn len(&self) -> usize {
        self.lock().merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Message at merged position `index`.
    pub fn get(&self, index: usize) -> Option<Message> {
        self.lock().merged.get(index).cloned()
    }

    pub fn local_messages(&self) -> Vec<Message> {
        self.lock().local.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn remote_messages(&self) -> Vec<Message> {
        self.lock().remote.iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        let inner = self.lock();
        TimelineSnapshot {
            messages: inner.merged.clone(),
            appended: inner.appended,
            last_appended: inner.last_appended().cloned(),
        }
    }
}
