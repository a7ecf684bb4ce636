//! Process wiring: socket, background tasks, frontend, shutdown.
//!
//! ```text
//!            ┌──────────── CancellationToken ────────────┐
//!            ▼                     ▼                     ▼
//!       puncher task          listener task         key/line reader
//!            │                     │                     │
//!            └──── Arc<Socket> ────┤                     │
//!                                  ▼                     ▼
//!                             Session::run ◀─────── UserInput
//! ```
//!
//! When the session leaves `Running`, the token is cancelled and both
//! background tasks are awaited (bounded by [`SHUTDOWN_GRACE`]) before the
//! session is marked `Terminated`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clipboard::{Clipboard, MemoryClipboard, Osc52Clipboard};
use crate::config::SessionConfig;
use crate::event::UserInput;
use crate::listener::spawn_listener;
use crate::plain::{spawn_line_reader, PlainRenderer};
use crate::puncher::spawn_puncher;
use crate::session::{Renderer, Session, SessionError};
use crate::socket::Socket;
use crate::timeline::Timeline;
use crate::tui::{spawn_key_reader, TerminalRenderer};

/// Upper bound on draining background tasks after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Keystrokes buffered ahead of the session.
const INPUT_BUFFER: usize = 64;

/// Which frontend drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    /// Full-screen ratatui interface.
    Terminal,
    /// stdin lines in, printed lines out.
    Plain,
}

/// Bind the configured port and run a session until it terminates.
pub async fn run(config: SessionConfig, frontend: Frontend) -> Result<(), SessionError> {
    let socket = Arc::new(Socket::bind_port(config.local_port).await?);
    log::info!("bound to port {}", socket.local_addr.port());
    log::info!("peer {}", config.peer);

    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    let cancel = CancellationToken::new();

    match frontend {
        Frontend::Terminal => {
            let mut renderer = TerminalRenderer::enter()?;
            spawn_key_reader(tx, cancel.clone());
            let clipboard = Box::new(Osc52Clipboard::stdout());
            let result = run_session(&config, socket, rx, &mut renderer, clipboard, cancel).await;
            let restored = renderer.leave();
            result?;
            restored?;
        }
        Frontend::Plain => {
            spawn_line_reader(tx);
            let mut renderer = PlainRenderer::stdout();
            let clipboard = Box::new(MemoryClipboard::default());
            run_session(&config, socket, rx, &mut renderer, clipboard, cancel).await?;
        }
    }
    Ok(())
}

/// Run one session over an already-bound socket.
///
/// Spawns the puncher and the listener, drives the session loop, then
/// cancels `cancel` and drains both tasks.  Returns the terminated session.
pub async fn run_session<R: Renderer>(
    config: &SessionConfig,
    socket: Arc<Socket>,
    inputs: mpsc::Receiver<UserInput>,
    renderer: &mut R,
    clipboard: Box<dyn Clipboard>,
    cancel: CancellationToken,
) -> Result<Session, SessionError> {
    let puncher = spawn_puncher(socket.clone(), config.peer, config.keepalive, cancel.clone());
    let (listener, streams) = spawn_listener(socket.clone(), config.read_deadline, cancel.clone());

    let mut session = Session::new(config, socket, Timeline::new(), clipboard);
    let result = session.run(inputs, streams, renderer).await;

    cancel.cancel();
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        let _ = puncher.await;
        let _ = listener.await;
    })
    .await;
    if drained.is_err() {
        log::warn!("[app] background tasks still running after {SHUTDOWN_GRACE:?}");
    }
    session.terminate();
    log::debug!("[app] session terminated");

    result.map(|()| session)
}
