//! Full-screen terminal frontend.
//!
//! ```text
//! ┌ punch-chat ─────────────────────────────────────────────┐
//! │ port 5000 ⇄ peer 10.0.0.5:6000   discovery 203.0.113.9  │
//! ├ messages ───────────────────────────────────────────────┤
//! │ 12:00:01 peer   (10.0.0.5:6000)     hi                  │
//! │ 12:00:03 you    (10.0.0.5:6000) ✓   hello               │
//! ├─────────────────────────────────────────────────────────┤
//! │ peer seen 0.4s ago                         copied!      │
//! ├ input ──────────────────────────────────────────────────┤
//! │ > _                                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are read on a dedicated thread with a bounded poll so the thread
//! notices shutdown promptly.

use std::io::{self, Stdout};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::{Frame, Terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::UserInput;
use crate::session::{Renderer, SessionError, View};
use crate::timeline::{Message, Origin};

/// Poll timeout of the key reader thread.
const KEY_POLL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Translate a key press into session input.
pub fn map_key(key: KeyEvent) -> Option<UserInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    Some(match key.code {
        KeyCode::Char('c') if ctrl => UserInput::Interrupt,
        KeyCode::Char(_) if ctrl => return None,
        KeyCode::Char(c) => UserInput::Char(c),
        KeyCode::Esc => UserInput::Interrupt,
        KeyCode::Enter => UserInput::Confirm,
        KeyCode::Up => UserInput::SelectUp,
        KeyCode::Down => UserInput::SelectDown,
        KeyCode::Left => UserInput::CaretLeft,
        KeyCode::Right => UserInput::CaretRight,
        KeyCode::Home => UserInput::CaretHome,
        KeyCode::End => UserInput::CaretEnd,
        KeyCode::Backspace => UserInput::Backspace,
        KeyCode::Delete => UserInput::Delete,
        _ => return None,
    })
}

/// Forward key presses to `tx` until `cancel` fires or the session hangs up.
pub fn spawn_key_reader(tx: mpsc::Sender<UserInput>, cancel: CancellationToken) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !cancel.is_cancelled() {
            let ready = match event::poll(KEY_POLL) {
                Ok(ready) => ready,
                Err(e) => {
                    log::warn!("[tui] terminal poll failed: {e}");
                    let _ = tx.blocking_send(UserInput::EndOfInput);
                    break;
                }
            };
            if !ready {
                continue;
            }
            let input = match event::read() {
                Ok(Event::Key(key)) => map_key(key),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("[tui] terminal read failed: {e}");
                    Some(UserInput::EndOfInput)
                }
            };
            if let Some(input) = input {
                if tx.blocking_send(input).is_err() {
                    break;
                }
            }
        }
        log::debug!("[tui] key reader stopped");
    })
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Draws views into an alternate screen.  Restores the terminal on drop.
pub struct TerminalRenderer<B: Backend> {
    terminal: Terminal<B>,
    raw: bool,
}

impl TerminalRenderer<CrosstermBackend<Stdout>> {
    /// Switch the terminal to raw mode and the alternate screen.
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(Self {
            terminal,
            raw: true,
        })
    }

    /// Undo [`TerminalRenderer::enter`].  Idempotent.
    pub fn leave(&mut self) -> io::Result<()> {
        if !self.raw {
            return Ok(());
        }
        self.raw = false;
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()
    }
}

impl<B: Backend> TerminalRenderer<B> {
    /// Wrap an existing terminal without touching terminal modes.
    pub fn with_terminal(terminal: Terminal<B>) -> Self {
        Self {
            terminal,
            raw: false,
        }
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }
}

impl<B: Backend> Drop for TerminalRenderer<B> {
    fn drop(&mut self) {
        if self.raw {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }
}

impl<B: Backend> Renderer for TerminalRenderer<B> {
    fn render(&mut self, view: &View) -> Result<(), SessionError> {
        self.terminal.draw(|frame| draw(frame, view))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

/// Render one frame.
pub fn draw(frame: &mut Frame, view: &View) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(3),    // Messages
            Constraint::Length(1), // Status
            Constraint::Length(3), // Input
        ])
        .split(frame.area());

    draw_header(frame, view, chunks[0]);
    draw_messages(frame, view, chunks[1]);
    draw_status(frame, view, chunks[2]);
    draw_input(frame, view, chunks[3]);
}

fn draw_header(frame: &mut Frame, view: &View, area: Rect) {
    let line = Line::from(vec![
        Span::styled(
            format!("port {}", view.local_port),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(" ⇄ "),
        Span::styled(
            format!("peer {}", view.peer),
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("   "),
        Span::styled(
            format!("discovery {}", view.discovery),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    let block = Block::default()
        .title(" punch-chat ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn origin_style(origin: Origin) -> Style {
    match origin {
        Origin::LocalUser => Style::default().fg(Color::Cyan),
        Origin::RemotePeer => Style::default().fg(Color::Green),
        Origin::System => Style::default().fg(Color::Yellow),
    }
}

fn message_line(message: &Message) -> Line<'static> {
    let mark = match (message.origin, message.delivered) {
        (Origin::LocalUser, true) => "✓",
        (Origin::LocalUser, false) => "?",
        _ => " ",
    };
    Line::from(vec![
        Span::styled(
            message.timestamp.format("%H:%M:%S ").to_string(),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(format!("{:<6} ", message.origin.label()), origin_style(message.origin)),
        Span::styled(
            format!("({}) ", message.remote),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(format!("{mark} ")),
        Span::raw(message.text.clone()),
    ])
}

fn draw_messages(frame: &mut Frame, view: &View, area: Rect) {
    let items: Vec<ListItem> = view
        .messages
        .iter()
        .map(|m| ListItem::new(message_line(m)))
        .collect();
    let list = List::new(items)
        .block(Block::default().title(" messages ").borders(Borders::ALL))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    match view.selected() {
        Some(i) => state.select(Some(i)),
        // Nothing selected: keep the newest messages in view.
        None => {
            let rows = area.height.saturating_sub(2) as usize;
            *state.offset_mut() = view.messages.len().saturating_sub(rows);
        }
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_status(frame: &mut Frame, view: &View, area: Rect) {
    let liveness = match view.keepalive_age {
        Some(age) if view.peer_alive() => Span::styled(
            format!(" peer seen {:.1}s ago", age.as_secs_f64()),
            Style::default().fg(Color::Green),
        ),
        Some(age) => Span::styled(
            format!(" peer silent for {:.1}s", age.as_secs_f64()),
            Style::default().fg(Color::Red),
        ),
        None => Span::styled(" no keepalive yet", Style::default().fg(Color::DarkGray)),
    };
    let mut spans = vec![liveness];
    if view.copied {
        spans.push(Span::styled(
            "   copied!",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
    }
    spans.push(Span::styled(
        "   ↑/↓ select · Enter copy/send · /getaddr · /quit",
        Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_input(frame: &mut Frame, view: &View, area: Rect) {
    let block = Block::default().title(" input ").borders(Borders::ALL);
    let text = Line::from(vec![Span::raw("> "), Span::raw(view.input.as_str())]);
    frame.render_widget(Paragraph::new(text).block(block), area);

    // Border plus "> " prompt, clamped to the last inner column.
    let last = usize::from(area.width.saturating_sub(2));
    let column = view.caret.saturating_add(3).min(last);
    let x = area
        .x
        .saturating_add(u16::try_from(column).unwrap_or(u16::MAX));
    frame.set_cursor_position((x, area.y.saturating_add(1)));
}
