//! Reactive session loop.
//!
//! # Architecture
//!
//! ```text
//!   key reader ──UserInput──┐
//!   listener ──Keepalive────┤      ┌──────────────────────────┐
//!   listener ──Data─────────┼────▶ │ Session::apply (one at a │ ──▶ Renderer
//!   ctrl-c ─────────────────┘      │ time: update, then view) │      (View)
//!                                  └──────┬─────────────┬─────┘
//!                                         │ send chat   │ append
//!                                         ▼             ▼
//!                                       Socket       Timeline
//! ```
//!
//! The session is the only writer of [`SessionState`] and the [`Timeline`],
//! and the only component that sends chat or discovery datagrams.  Each
//! event is applied to completion and followed by a render before the next
//! one is taken.  Renderers receive an immutable [`View`] and cannot reach
//! back into the session.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::clipboard::Clipboard;
use crate::config::SessionConfig;
use crate::discovery::DiscoveryClient;
use crate::event::{NetEvent, UserInput};
use crate::listener::EventStreams;
use crate::socket::{Socket, SocketError};
use crate::state::{SessionPhase, SessionState};
use crate::timeline::{delivery_confidence, Message, Timeline};

/// Typed input that quits the session.
pub const QUIT_COMMAND: &str = "/quit";

/// Typed input that triggers a discovery query.
pub const GETADDR_COMMAND: &str = "/getaddr";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    /// Binding or configuring the socket failed.
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// Both network streams closed while the session was still running.
    #[error("network listener stopped unexpectedly")]
    TransportClosed,
    /// The frontend could not draw.
    #[error("render failed: {0}")]
    Render(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Events and views
// ---------------------------------------------------------------------------

/// Everything the loop reacts to, matched exhaustively in [`Session::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Input(UserInput),
    Net(NetEvent),
    /// Process interrupt (SIGINT).
    Interrupt,
}

/// Read-only snapshot handed to renderers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub local_port: u16,
    pub peer: SocketAddr,
    pub discovery: SocketAddr,
    pub messages: Vec<Message>,
    /// Total appends so far; lets line-oriented renderers print each once.
    pub appended: u64,
    pub last_appended: Option<Message>,
    pub cursor: usize,
    pub hovered: String,
    pub copied: bool,
    pub input: String,
    /// Caret position within `input`, in characters.
    pub caret: usize,
    /// Time since the peer's last `ping`, if any arrived.
    pub keepalive_age: Option<Duration>,
    pub keepalive_window: Duration,
    pub phase: SessionPhase,
}

impl View {
    /// Merged position of the selected message, if any.
    pub fn selected(&self) -> Option<usize> {
        (self.cursor < self.messages.len()).then_some(self.cursor)
    }

    /// Whether the NAT mapping was confirmed open within the window.
    pub fn peer_alive(&self) -> bool {
        self.keepalive_age
            .is_some_and(|age| age <= self.keepalive_window)
    }
}

/// Frontend that turns views into output.  Must not keep session state.
pub trait Renderer {
    fn render(&mut self, view: &View) -> Result<(), SessionError>;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The single consumer of all event streams.
pub struct Session {
    state: SessionState,
    timeline: Timeline,
    socket: Arc<Socket>,
    discovery: DiscoveryClient,
    clipboard: Box<dyn Clipboard>,
    keepalive_window: Duration,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("timeline_len", &self.timeline.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        config: &SessionConfig,
        socket: Arc<Socket>,
        timeline: Timeline,
        clipboard: Box<dyn Clipboard>,
    ) -> Self {
        let discovery = DiscoveryClient::new(socket.clone(), config.discovery);
        Self {
            state: SessionState::new(socket.local_addr.port(), config.peer, config.discovery),
            timeline,
            socket,
            discovery,
            clipboard,
            keepalive_window: config.keepalive.interval,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Called once background tasks have been drained.
    pub fn terminate(&mut self) {
        self.state.phase = SessionPhase::Terminated;
    }

    pub fn view(&self) -> View {
        let snapshot = self.timeline.snapshot();
        View {
            local_port: self.state.local_port,
            peer: self.state.peer,
            discovery: self.state.discovery,
            messages: snapshot.messages,
            appended: snapshot.appended,
            last_appended: snapshot.last_appended,
            cursor: self.state.cursor,
            hovered: self.state.hovered.clone(),
            copied: self.state.copied,
            input: self.state.input.text(),
            caret: self.state.input.caret(),
            keepalive_age: self.state.last_keepalive.map(|seen| seen.elapsed()),
            keepalive_window: self.keepalive_window,
            phase: self.state.phase,
        }
    }

    /// Consume events until shutdown is requested.
    ///
    /// Renders once up front and once after every event.  Returns
    /// [`SessionError::TransportClosed`] if the listener's streams both end
    /// while the session is still running.
    pub async fn run<R: Renderer>(
        &mut self,
        mut inputs: mpsc::Receiver<UserInput>,
        mut streams: EventStreams,
        renderer: &mut R,
    ) -> Result<(), SessionError> {
        let mut keepalive_open = true;
        let mut data_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        renderer.render(&self.view())?;

        while !self.state.shutdown_requested() {
            if !keepalive_open && !data_open {
                self.begin_shutdown("transport closed");
                renderer.render(&self.view())?;
                return Err(SessionError::TransportClosed);
            }

            let event = tokio::select! {
                input = inputs.recv() => SessionEvent::Input(input.unwrap_or(UserInput::EndOfInput)),
                ev = streams.keepalive.recv(), if keepalive_open => match ev {
                    Some(ev) => SessionEvent::Net(ev),
                    None => {
                        keepalive_open = false;
                        continue;
                    }
                },
                ev = streams.data.recv(), if data_open => match ev {
                    Some(ev) => SessionEvent::Net(ev),
                    None => {
                        data_open = false;
                        continue;
                    }
                },
                _ = &mut ctrl_c => SessionEvent::Interrupt,
            };

            self.apply(event).await;
            renderer.render(&self.view())?;
        }

        Ok(())
    }

    /// Apply exactly one transition.
    pub async fn apply(&mut self, event: SessionEvent) {
        if self.state.shutdown_requested() {
            return;
        }
        match event {
            SessionEvent::Input(input) => self.on_input(input).await,
            SessionEvent::Net(NetEvent::Keepalive { received_at, from }) => {
                log::trace!("[session] keepalive from {from}");
                self.state.last_keepalive = Some(received_at);
            }
            SessionEvent::Net(NetEvent::Data {
                timestamp,
                from,
                text,
                ..
            }) => {
                let message = match DiscoveryClient::interpret(&text) {
                    Some(reply) => Message::system(
                        timestamp,
                        self.discovery.endpoint(),
                        reply.display_text(),
                    ),
                    None => Message::remote(timestamp, from, text),
                };
                self.state.cursor += 1;
                let len = self.timeline.append_remote(message);
                self.after_append(len);
            }
            SessionEvent::Interrupt => self.begin_shutdown("interrupt"),
        }
    }

    async fn on_input(&mut self, input: UserInput) {
        match input {
            UserInput::SelectUp => self.move_selection(true),
            UserInput::SelectDown => self.move_selection(false),
            UserInput::Confirm => self.confirm().await,
            UserInput::Line(line) => {
                self.state.input.set(&line);
                self.confirm().await;
            }
            UserInput::Char(c) => self.state.input.insert(c),
            UserInput::Backspace => self.state.input.backspace(),
            UserInput::Delete => self.state.input.delete(),
            UserInput::CaretLeft => self.state.input.left(),
            UserInput::CaretRight => self.state.input.right(),
            UserInput::CaretHome => self.state.input.home(),
            UserInput::CaretEnd => self.state.input.end(),
            UserInput::Interrupt => self.begin_shutdown("interrupt key"),
            UserInput::EndOfInput => self.begin_shutdown("end of input"),
        }
    }

    fn move_selection(&mut self, up: bool) {
        let len = self.timeline.len();
        let cursor = self.state.cursor.min(len);
        self.state.cursor = if up {
            cursor.saturating_sub(1)
        } else {
            (cursor + 1).min(len)
        };
        self.state.copied = false;
        self.refresh_hovered();
    }

    async fn confirm(&mut self) {
        if let Some(message) = self.timeline.get(self.state.cursor) {
            match self.clipboard.copy(&message.text) {
                Ok(()) => self.state.copied = true,
                Err(e) => log::warn!("[session] copy failed: {e}"),
            }
            return;
        }

        let text = self.state.input.text();
        match text.as_str() {
            "" => {}
            QUIT_COMMAND => self.begin_shutdown("quit command"),
            GETADDR_COMMAND => {
                self.state.input.clear();
                self.discovery.request_address();
            }
            _ => self.send_chat(text).await,
        }
    }

    async fn send_chat(&mut self, text: String) {
        self.state.cursor += 1;
        let delivered = delivery_confidence(
            Instant::now(),
            self.state.last_keepalive,
            self.keepalive_window,
        );
        let peer = self.state.peer;
        let len = self
            .timeline
            .append_local(Message::local(Local::now(), peer, text.as_str(), delivered));
        self.after_append(len);
        self.state.copied = false;
        self.state.input.clear();

        match self.socket.send_to(text.as_bytes(), peer).await {
            Ok(()) => log::debug!("[session] → {} byte(s) to {peer}", text.len()),
            Err(e) => log::debug!("[session] send to {peer} failed (ignored): {e}"),
        }
    }

    // The cursor was bumped before the append so it keeps pointing one past
    // the newest message.  When the cursor sits on an older message and the
    // new one sorts after it, the bump moves the selection to a neighbour.
    fn after_append(&mut self, len: usize) {
        self.state.cursor = self.state.cursor.min(len);
        self.refresh_hovered();
    }

    fn refresh_hovered(&mut self) {
        self.state.hovered = self
            .timeline
            .get(self.state.cursor)
            .map(|m| m.text)
            .unwrap_or_default();
    }

    fn begin_shutdown(&mut self, reason: &str) {
        if self.state.phase == SessionPhase::Running {
            log::debug!("[session] shutting down: {reason}");
            self.state.phase = SessionPhase::ShuttingDown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::{ClipboardError, MemoryClipboard};
    use crate::timeline::Origin;
    use std::sync::Mutex;

    /// Clipboard whose copies stay observable after the session owns it.
    #[derive(Clone, Default)]
    struct SharedClipboard(Arc<Mutex<MemoryClipboard>>);

    impl Clipboard for SharedClipboard {
        fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
            self.0.lock().unwrap().copy(text)
        }
    }

    struct Fixture {
        session: Session,
        peer: Socket,
        discovery: Socket,
        clipboard: SharedClipboard,
    }

    async fn fixture(keepalive: Duration) -> Fixture {
        let local = Arc::new(Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap());
        let peer = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let discovery = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut config = SessionConfig::new(
            local.local_addr.port(),
            "127.0.0.1",
            peer.local_addr.port(),
            "127.0.0.1",
            keepalive,
        )
        .unwrap();
        config.discovery = discovery.local_addr;
        let clipboard = SharedClipboard::default();
        let session = Session::new(&config, local, Timeline::new(), Box::new(clipboard.clone()));
        Fixture {
            session,
            peer,
            discovery,
            clipboard,
        }
    }

    fn data(from: SocketAddr, text: &str) -> SessionEvent {
        SessionEvent::Net(NetEvent::Data {
            timestamp: Local::now(),
            from,
            text: text.to_string(),
        })
    }

    fn keepalive_ago(from: SocketAddr, ago: Duration) -> SessionEvent {
        SessionEvent::Net(NetEvent::Keepalive {
            received_at: Instant::now() - ago,
            from,
        })
    }

    async fn type_line(session: &mut Session, line: &str) {
        for c in line.chars() {
            session.apply(SessionEvent::Input(UserInput::Char(c))).await;
        }
        session.apply(SessionEvent::Input(UserInput::Confirm)).await;
    }

    #[tokio::test]
    async fn typed_text_is_sent_and_echoed_without_confidence() {
        let Fixture { mut session, peer, .. } = fixture(Duration::from_secs(1)).await;

        type_line(&mut session, "hello").await;

        let local = session.timeline().local_messages();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].text, "hello");
        assert_eq!(local[0].origin, Origin::LocalUser);
        assert!(!local[0].delivered);
        assert_eq!(session.state().cursor, 1);
        assert!(session.state().input.is_empty());

        let (bytes, _) = peer
            .recv_within(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("chat datagram");
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn fresh_keepalive_gives_confidence() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session
            .apply(keepalive_ago(from, Duration::from_millis(100)))
            .await;
        type_line(&mut f.session, "hi").await;
        assert!(f.session.timeline().local_messages()[0].delivered);
    }

    #[tokio::test]
    async fn stale_keepalive_gives_no_confidence() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;

        f.session
            .apply(keepalive_ago(from, Duration::from_millis(1200)))
            .await;
        type_line(&mut f.session, "late").await;

        f.session
            .apply(keepalive_ago(from, Duration::from_millis(300)))
            .await;
        type_line(&mut f.session, "fresh").await;

        let local = f.session.timeline().local_messages();
        assert!(!local[0].delivered);
        assert!(local[1].delivered);
    }

    #[tokio::test]
    async fn keepalive_never_creates_a_message() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(keepalive_ago(from, Duration::ZERO)).await;
        assert!(f.session.timeline().is_empty());
        assert_eq!(f.session.state().cursor, 0);
        assert!(f.session.state().last_keepalive.is_some());
    }

    #[tokio::test]
    async fn remote_chat_is_appended_and_cursor_follows() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(data(from, "yo")).await;

        let remote = f.session.timeline().remote_messages();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].origin, Origin::RemotePeer);
        assert_eq!(remote[0].remote, from);
        assert_eq!(remote[0].text, "yo");
        assert_eq!(f.session.state().cursor, 1);
        assert_eq!(f.session.view().selected(), None);
    }

    #[tokio::test]
    async fn discovery_reply_becomes_a_system_message() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let discovery_addr = f.discovery.local_addr;

        type_line(&mut f.session, "/getaddr").await;
        assert!(f.session.state().input.is_empty());
        let (bytes, _) = f
            .discovery
            .recv_within(Duration::from_secs(2))
            .await
            .unwrap()
            .expect("whoami");
        assert_eq!(bytes, b"whoami");

        f.session
            .apply(data(discovery_addr, "addr:203.0.113.9:40000"))
            .await;
        let messages = f.session.timeline().snapshot().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, Origin::System);
        assert_eq!(messages[0].text, "203.0.113.9:40000");
        assert_eq!(messages[0].remote, discovery_addr);
    }

    #[tokio::test]
    async fn malformed_discovery_reply_is_still_shown() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.discovery.local_addr;
        f.session.apply(data(from, "addr:garbage")).await;
        let messages = f.session.timeline().snapshot().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].origin, Origin::System);
        assert_eq!(messages[0].text, "garbage");
    }

    #[tokio::test]
    async fn getaddr_is_not_deduplicated() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let discovery_addr = f.discovery.local_addr;

        type_line(&mut f.session, "/getaddr").await;
        type_line(&mut f.session, "/getaddr").await;
        for _ in 0..2 {
            let (bytes, _) = f
                .discovery
                .recv_within(Duration::from_secs(2))
                .await
                .unwrap()
                .expect("whoami");
            assert_eq!(bytes, b"whoami");
        }

        f.session.apply(data(discovery_addr, "addr:1.2.3.4:1")).await;
        f.session.apply(data(discovery_addr, "addr:1.2.3.4:1")).await;
        let system = f
            .session
            .timeline()
            .snapshot()
            .messages
            .into_iter()
            .filter(|m| m.origin == Origin::System)
            .count();
        assert_eq!(system, 2);
    }

    #[tokio::test]
    async fn cursor_is_clamped_both_ways() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        for text in ["a", "b", "c"] {
            f.session.apply(data(from, text)).await;
        }

        for _ in 0..10 {
            f.session.apply(SessionEvent::Input(UserInput::SelectDown)).await;
            assert!(f.session.state().cursor <= 3);
        }
        assert_eq!(f.session.state().cursor, 3);
        assert_eq!(f.session.state().hovered, "");

        for _ in 0..10 {
            f.session.apply(SessionEvent::Input(UserInput::SelectUp)).await;
        }
        assert_eq!(f.session.state().cursor, 0);
        assert_eq!(f.session.state().hovered, "a");
    }

    #[tokio::test]
    async fn confirm_on_selection_copies_and_keeps_input() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(data(from, "copy me")).await;
        f.session.apply(SessionEvent::Input(UserInput::Char('x'))).await;
        f.session.apply(SessionEvent::Input(UserInput::SelectUp)).await;
        f.session.apply(SessionEvent::Input(UserInput::Confirm)).await;

        assert!(f.session.state().copied);
        assert_eq!(f.session.state().input.text(), "x");
        assert_eq!(f.clipboard.0.lock().unwrap().copies, ["copy me"]);
        assert_eq!(f.session.timeline().len(), 1);

        // Navigation clears the copied flag.
        f.session.apply(SessionEvent::Input(UserInput::SelectDown)).await;
        assert!(!f.session.state().copied);
    }

    #[tokio::test]
    async fn empty_confirm_is_a_no_op() {
        let mut f = fixture(Duration::from_secs(1)).await;
        f.session.apply(SessionEvent::Input(UserInput::Confirm)).await;
        assert!(f.session.timeline().is_empty());
        assert_eq!(f.session.phase(), SessionPhase::Running);
        assert!(f
            .peer
            .recv_within(Duration::from_millis(100))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn quit_and_interrupt_begin_shutdown() {
        let mut f = fixture(Duration::from_secs(1)).await;
        type_line(&mut f.session, "/quit").await;
        assert_eq!(f.session.phase(), SessionPhase::ShuttingDown);

        let mut g = fixture(Duration::from_secs(1)).await;
        g.session.apply(SessionEvent::Interrupt).await;
        assert_eq!(g.session.phase(), SessionPhase::ShuttingDown);
        g.session.terminate();
        assert_eq!(g.session.phase(), SessionPhase::Terminated);
    }

    #[tokio::test]
    async fn events_after_shutdown_are_ignored() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(SessionEvent::Interrupt).await;
        f.session.apply(data(from, "too late")).await;
        assert!(f.session.timeline().is_empty());
    }

    #[tokio::test]
    async fn new_message_after_the_cursor_shifts_the_hovered_item() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(data(from, "first")).await;
        f.session.apply(data(from, "second")).await;
        f.session.apply(SessionEvent::Input(UserInput::SelectUp)).await;
        f.session.apply(SessionEvent::Input(UserInput::SelectUp)).await;
        assert_eq!(f.session.state().hovered, "first");

        // Lands at the end, yet the cursor still advances by one.
        f.session.apply(data(from, "third")).await;
        assert_eq!(f.session.state().cursor, 1);
        assert_eq!(f.session.state().hovered, "second");
    }

    #[tokio::test]
    async fn delayed_remote_sorting_first_keeps_the_hovered_item() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let from = f.peer.local_addr;
        f.session.apply(data(from, "first")).await;
        f.session.apply(SessionEvent::Input(UserInput::SelectUp)).await;

        f.session
            .apply(SessionEvent::Net(NetEvent::Data {
                timestamp: Local::now() - chrono::Duration::seconds(60),
                from,
                text: "delayed".into(),
            }))
            .await;

        assert_eq!(f.session.timeline().get(0).unwrap().text, "delayed");
        assert_eq!(f.session.state().cursor, 1);
        assert_eq!(f.session.state().hovered, "first");
    }

    #[tokio::test]
    async fn view_reflects_state_without_mutating_it() {
        let mut f = fixture(Duration::from_secs(1)).await;
        f.session.apply(SessionEvent::Input(UserInput::Char('h'))).await;
        let a = f.session.view();
        let b = f.session.view();
        assert_eq!(a.input, "h");
        assert_eq!(a.caret, 1);
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.cursor, b.cursor);
        assert!(!a.peer_alive());
    }

    struct NullRenderer {
        frames: usize,
    }

    impl Renderer for NullRenderer {
        fn render(&mut self, _view: &View) -> Result<(), SessionError> {
            self.frames += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn closed_network_streams_end_the_session_with_an_error() {
        let mut f = fixture(Duration::from_secs(1)).await;
        let (publishers, streams) = crate::listener::event_channels();
        drop(publishers);
        let (_tx, rx) = mpsc::channel(1);
        let mut renderer = NullRenderer { frames: 0 };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            f.session.run(rx, streams, &mut renderer),
        )
        .await
        .expect("session kept running without a transport");

        assert!(matches!(result, Err(SessionError::TransportClosed)));
        assert_eq!(f.session.phase(), SessionPhase::ShuttingDown);
        assert!(renderer.frames >= 2);
    }
}
