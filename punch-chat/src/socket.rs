//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! plaintext datagrams.  All protocol logic lives elsewhere; this module owns
//! only byte I/O plus the bounded-wait receive the listener relies on.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::wire::MAX_DATAGRAM;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Binding the local port failed (in use, no permission, ...).
    #[error("failed to bind to port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self` so one socket can be shared (via `Arc`) by the
/// puncher, the listener, and the session.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind to `0.0.0.0:<port>` on all interfaces.
    pub async fn bind_port(port: u16) -> Result<Self, SocketError> {
        Self::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await
    }

    /// Bind a new socket to `local_addr`.
    ///
    /// Passing port `0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr)
            .await
            .map_err(|source| SocketError::Bind {
                port: local_addr.port(),
                source,
            })?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `payload` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, payload: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.inner.send_to(payload, dest).await?;
        Ok(())
    }

    /// Receive the next datagram, waiting at most `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passes with nothing to read.
    pub async fn recv_within(
        &self,
        deadline: Duration,
    ) -> Result<Option<(Vec<u8>, SocketAddr)>, SocketError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        match tokio::time::timeout(deadline, self.inner.recv_from(&mut buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok((n, addr))) => Ok(Some((buf[..n].to_vec(), addr))),
            Ok(Err(e)) => Err(e.into()),
        }
    }
}
