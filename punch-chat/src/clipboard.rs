//! Clipboard collaborators.
//!
//! The session only needs "put this text on the clipboard".  In a terminal
//! the portable way is the OSC 52 escape sequence, which the terminal
//! emulator (also over SSH) turns into a system clipboard write.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for copied message text.
pub trait Clipboard: Send {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// Writes `ESC ] 52 ; c ; <base64> BEL` to the wrapped writer.
#[derive(Debug)]
pub struct Osc52Clipboard<W: Write + Send> {
    out: W,
}

impl Osc52Clipboard<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Clipboard for Osc52Clipboard<W> {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
        write!(self.out, "\x1b]52;c;{}\x07", STANDARD.encode(text))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every copied string; for headless runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryClipboard {
    pub copies: Vec<String>,
}

impl Clipboard for MemoryClipboard {
    fn copy(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.copies.push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn osc52_sequence() {
        let mut clip = Osc52Clipboard::new(Vec::new());
        clip.copy("hi").unwrap();
        assert_eq!(clip.into_inner(), b"\x1b]52;c;aGk=\x07");
    }

    #[test]
    fn memory_clipboard_records_copies() {
        let mut clip = MemoryClipboard::default();
        clip.copy("a").unwrap();
        clip.copy("b").unwrap();
        assert_eq!(clip.copies, ["a", "b"]);
    }
}
