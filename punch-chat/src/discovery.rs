//! Client side of the external-address discovery exchange.
//!
//! ```text
//!  session ── whoami ──▶ discovery host (fixed, pre-shared address)
//!     ▲                         │
//!     └── addr:<ip:port> ◀──────┘   (arrives later as a data event)
//! ```
//!
//! The server side is an external service and is not implemented here.
//! Queries are not deduplicated: every request sends a fresh `whoami`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::socket::Socket;
use crate::wire::{DiscoveryReply, WHOAMI};

/// Fixed UDP port of the discovery service.
pub const DISCOVERY_PORT: u16 = 50000;

/// Sends discovery queries over the shared chat socket.
///
/// The reply must come back to the same socket, so the query has to leave
/// from it too: the discovery host reports the NAT mapping it observed.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    socket: Arc<Socket>,
    endpoint: SocketAddr,
}

impl DiscoveryClient {
    pub fn new(socket: Arc<Socket>, endpoint: SocketAddr) -> Self {
        Self { socket, endpoint }
    }

    /// Address queries are sent to.
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    /// Fire a `whoami` at the discovery host and return immediately.
    ///
    /// The send runs on its own task; a failure is logged and dropped.  The
    /// returned handle may be ignored.
    pub fn request_address(&self) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let endpoint = self.endpoint;
        tokio::spawn(async move {
            match socket.send_to(WHOAMI.as_bytes(), endpoint).await {
                Ok(()) => log::debug!("[discovery] → whoami {endpoint}"),
                Err(e) => log::debug!("[discovery] whoami to {endpoint} failed (ignored): {e}"),
            }
        })
    }

    /// Recognise a discovery reply among data events.
    pub fn interpret(text: &str) -> Option<DiscoveryReply> {
        DiscoveryReply::parse(text)
    }
}
