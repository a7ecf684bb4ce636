//! Session finite-state machine types.
//!
//! ```text
//!  RUNNING ──/quit, interrupt, transport failure──▶ SHUTTING_DOWN
//!                                                       │
//!                                 background tasks drained
//!                                                       ▼
//!                                                  TERMINATED
//! ```
//!
//! Transitions are driven by [`crate::session::Session`]; this module only
//! holds the data they act on.

use std::net::SocketAddr;
use std::time::Instant;

use crate::input::InputBuffer;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Consuming events.
    #[default]
    Running,
    /// Shutdown signal raised; background tasks are being drained.
    ShuttingDown,
    /// Everything stopped; the process may exit.
    Terminated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::ShuttingDown => "shutting down",
            Self::Terminated => "terminated",
        })
    }
}

/// Mutable per-session state.  Owned by the session loop alone.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub local_port: u16,
    pub peer: SocketAddr,
    pub discovery: SocketAddr,
    /// When the peer's last `ping` arrived.
    pub last_keepalive: Option<Instant>,
    pub phase: SessionPhase,
    /// Selection cursor in `0..=timeline_len`; `timeline_len` means "none".
    pub cursor: usize,
    /// Set after the hovered message was copied; cleared by navigation and sends.
    pub copied: bool,
    /// Text of the hovered message, empty when nothing is selected.
    pub hovered: String,
    pub input: InputBuffer,
}

impl SessionState {
    pub fn new(local_port: u16, peer: SocketAddr, discovery: SocketAddr) -> Self {
        Self {
            local_port,
            peer,
            discovery,
            last_keepalive: None,
            phase: SessionPhase::Running,
            cursor: 0,
            copied: false,
            hovered: String::new(),
            input: InputBuffer::new(),
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.phase != SessionPhase::Running
    }
}
