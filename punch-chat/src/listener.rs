//! Datagram listener and classifier.
//!
//! ```text
//!              ┌───────────────┐  Keepalive  ┌────────────────┐
//!  Socket ───▶ │   listener    │────────────▶│ keepalive rx   │──┐
//!  (100 ms     │ (recv+classify│             └────────────────┘  │ Session
//!   deadline)  │   loop task)  │  Data       ┌────────────────┐  │  loop
//!              └───────────────┘────────────▶│ data rx        │──┘
//!                                            └────────────────┘
//! ```
//!
//! Both streams have capacity one: a publish waits until the session has
//! taken the previous event, so at most one undelivered event sits in each
//! stream.  Receive errors and deadline expiries are swallowed; the loop
//! only ends on cancellation or when the session drops its receivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::NetEvent;
use crate::socket::Socket;
use crate::wire::Payload;

/// Default bounded wait for one receive.
pub const READ_DEADLINE: Duration = Duration::from_millis(100);

/// Consumer half of the listener's two event streams.
#[derive(Debug)]
pub struct EventStreams {
    pub keepalive: mpsc::Receiver<NetEvent>,
    pub data: mpsc::Receiver<NetEvent>,
}

/// Producer half, held by the listener task.
#[derive(Debug, Clone)]
pub struct Publishers {
    pub keepalive: mpsc::Sender<NetEvent>,
    pub data: mpsc::Sender<NetEvent>,
}

/// Create the keep-alive and data streams.
pub fn event_channels() -> (Publishers, EventStreams) {
    let (keepalive_tx, keepalive_rx) = mpsc::channel(1);
    let (data_tx, data_rx) = mpsc::channel(1);
    (
        Publishers {
            keepalive: keepalive_tx,
            data: data_tx,
        },
        EventStreams {
            keepalive: keepalive_rx,
            data: data_rx,
        },
    )
}

/// Spawn the listener on the current runtime.
pub fn spawn_listener(
    socket: Arc<Socket>,
    deadline: Duration,
    cancel: CancellationToken,
) -> (JoinHandle<()>, EventStreams) {
    let (publishers, streams) = event_channels();
    let handle = tokio::spawn(run_listener(socket, deadline, publishers, cancel));
    (handle, streams)
}

/// Drain `socket` until `cancel` fires or both consumers go away.
///
/// Remaining buffered datagrams are not drained on shutdown.
pub async fn run_listener(
    socket: Arc<Socket>,
    deadline: Duration,
    publishers: Publishers,
    cancel: CancellationToken,
) {
    log::debug!("[listener] started on {}", socket.local_addr);

    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = socket.recv_within(deadline) => r,
        };

        let (bytes, from) = match received {
            Ok(Some(datagram)) => datagram,
            Ok(None) => continue,
            Err(e) => {
                log::trace!("[listener] receive error (ignored): {e}");
                continue;
            }
        };

        let received_at = Instant::now();
        let (tx, event) = match Payload::classify(&bytes) {
            Payload::Keepalive => (
                &publishers.keepalive,
                NetEvent::Keepalive { received_at, from },
            ),
            Payload::Data(text) => {
                log::debug!("[listener] ← {} byte(s) from {from}", bytes.len());
                (
                    &publishers.data,
                    NetEvent::Data {
                        timestamp: Local::now(),
                        from,
                        text,
                    },
                )
            }
        };

        let published = tokio::select! {
            _ = cancel.cancelled() => break,
            r = tx.send(event) => r,
        };
        if published.is_err() {
            log::debug!("[listener] consumer gone, exiting");
            break;
        }
    }

    log::debug!("[listener] stopped");
}
