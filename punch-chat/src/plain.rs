//! Line-oriented frontend for dumb terminals and pipes.
//!
//! Every stdin line is submitted as if typed and confirmed; each newly
//! appended message is printed once.  Received chat uses the classic
//! `(IP: <ip>, Port: <port>)> <text>` format.

use std::io::{self, BufRead, Write};
use std::thread::JoinHandle;

use tokio::sync::mpsc;

use crate::event::UserInput;
use crate::session::{Renderer, SessionError, View};
use crate::state::SessionPhase;
use crate::timeline::{Message, Origin};

/// Feed stdin lines to the session; EOF ends input.
///
/// Runs on a plain thread: a blocking stdin read cannot be cancelled, and
/// the thread must not hold up runtime shutdown.
pub fn spawn_line_reader(tx: mpsc::Sender<UserInput>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let input = match line {
                Ok(line) => UserInput::Line(line),
                Err(e) => {
                    log::warn!("[plain] stdin read failed: {e}");
                    break;
                }
            };
            if tx.blocking_send(input).is_err() {
                return;
            }
        }
        let _ = tx.blocking_send(UserInput::EndOfInput);
    })
}

/// Format one message the way the plain frontend prints it.
pub fn format_message(message: &Message) -> String {
    match message.origin {
        Origin::RemotePeer => format!(
            "(IP: {}, Port: {})> {}",
            message.remote.ip(),
            message.remote.port(),
            message.text
        ),
        Origin::LocalUser => format!(
            "(you)> {} [{}]",
            message.text,
            if message.delivered { "✓" } else { "?" }
        ),
        Origin::System => format!("(system)> {}", message.text),
    }
}

/// Prints new messages and lifecycle banners to a writer.
#[derive(Debug)]
pub struct PlainRenderer<W: Write> {
    out: W,
    printed: u64,
    greeted: bool,
    farewell: bool,
}

impl PlainRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            greeted: false,
            farewell: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for PlainRenderer<W> {
    fn render(&mut self, view: &View) -> Result<(), SessionError> {
        if !self.greeted {
            self.greeted = true;
            writeln!(self.out, "Bound to port {}", view.local_port)?;
            writeln!(self.out, "Connected to {}", view.peer)?;
            writeln!(
                self.out,
                "Type your message and press Enter. Type '/getaddr' to learn your address, '/quit' to exit."
            )?;
        }

        // One event appends at most one message, so the newest is the only
        // one not yet printed.
        if view.appended > self.printed {
            if let Some(message) = &view.last_appended {
                writeln!(self.out, "{}", format_message(message))?;
            }
            self.printed = view.appended;
        }

        if view.phase != SessionPhase::Running && !self.farewell {
            self.farewell = true;
            writeln!(self.out, "Shutting down...")?;
        }

        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::time::Duration;

    fn peer() -> std::net::SocketAddr {
        "10.0.0.5:6000".parse().unwrap()
    }

    fn view(messages: Vec<Message>, phase: SessionPhase) -> View {
        View {
            local_port: 5000,
            peer: peer(),
            discovery: "203.0.113.9:50000".parse().unwrap(),
            appended: messages.len() as u64,
            last_appended: messages.last().cloned(),
            messages,
            cursor: 0,
            hovered: String::new(),
            copied: false,
            input: String::new(),
            caret: 0,
            keepalive_age: None,
            keepalive_window: Duration::from_secs(1),
            phase,
        }
    }

    #[test]
    fn formats() {
        let now = Local::now();
        assert_eq!(
            format_message(&Message::remote(now, peer(), "hi")),
            "(IP: 10.0.0.5, Port: 6000)> hi"
        );
        assert_eq!(
            format_message(&Message::local(now, peer(), "yo", false)),
            "(you)> yo [?]"
        );
        assert_eq!(
            format_message(&Message::system(now, peer(), "1.2.3.4:5")),
            "(system)> 1.2.3.4:5"
        );
    }

    #[test]
    fn prints_each_message_once() {
        let mut renderer = PlainRenderer::new(Vec::new());
        let first = Message::remote(Local::now(), peer(), "one");
        let second = Message::remote(Local::now(), peer(), "two");

        renderer.render(&view(vec![], SessionPhase::Running)).unwrap();
        renderer
            .render(&view(vec![first.clone()], SessionPhase::Running))
            .unwrap();
        // Re-render without a new append (e.g. after a keystroke).
        renderer
            .render(&view(vec![first.clone()], SessionPhase::Running))
            .unwrap();
        renderer
            .render(&view(vec![first, second], SessionPhase::ShuttingDown))
            .unwrap();

        let out = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(out.matches("> one").count(), 1);
        assert_eq!(out.matches("> two").count(), 1);
        assert!(out.starts_with("Bound to port 5000\n"));
        assert!(out.ends_with("Shutting down...\n"));
    }
}
