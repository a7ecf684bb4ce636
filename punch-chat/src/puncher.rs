//! Keep-alive / hole-punch timer.
//!
//! A NAT drops an idle UDP mapping after some tens of seconds.  The puncher
//! keeps ours open by sending [`crate::wire::PING`] to the peer on a fixed
//! interval.  The same interval doubles as the freshness window for the
//! delivery-confidence heuristic (see [`crate::timeline::delivery_confidence`]).
//!
//! Sends are fire-and-forget: a failed send is logged at trace level and the
//! next tick fires on schedule.  There is no back-off.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::socket::Socket;
use crate::wire::PING;

/// Adjustable keep-alive parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Interval between hole-punch datagrams.
    pub interval: Duration,
}

impl KeepaliveConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
    pub const MAX_INTERVAL: Duration = Duration::from_secs(60);
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

/// Spawn the puncher on the current runtime.
pub fn spawn_puncher(
    socket: Arc<Socket>,
    peer: SocketAddr,
    config: KeepaliveConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_puncher(socket, peer, config, cancel))
}

/// Send `ping` to `peer` every `config.interval` until `cancel` fires.
///
/// The first ping goes out one full interval after start.
pub async fn run_puncher(
    socket: Arc<Socket>,
    peer: SocketAddr,
    config: KeepaliveConfig,
    cancel: CancellationToken,
) {
    let start = tokio::time::Instant::now() + config.interval;
    let mut ticker = tokio::time::interval_at(start, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("[puncher] → {peer} every {:?}", config.interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = socket.send_to(PING.as_bytes(), peer).await {
                    log::trace!("[puncher] ping to {peer} failed (ignored): {e}");
                }
            }
        }
    }

    log::debug!("[puncher] stopped");
}
