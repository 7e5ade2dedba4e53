//! Rendered transcript
//!
//! What the user sees of the conversation. The terminal renderer prints to
//! stdout; [`MemoryTranscript`] records everything for tests and embedders.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Who a rendered line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    /// Status lines that are not part of the conversation
    Notice,
}

/// One rendered line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// A surface the conversation is rendered on
pub trait Transcript: Send {
    fn append(&mut self, speaker: Speaker, text: &str);

    /// Show that a reply is on its way
    fn show_typing(&mut self);

    fn hide_typing(&mut self);

    fn clear(&mut self);

    /// Show not-yet-sent speech input
    fn preview(&mut self, text: &str);
}

/// Renders to stdout
pub struct TerminalTranscript {
    assistant_name: String,
    typing: bool,
}

impl TerminalTranscript {
    #[must_use]
    pub fn new(assistant_name: &str) -> Self {
        Self {
            assistant_name: assistant_name.to_string(),
            typing: false,
        }
    }
}

fn clear_line() {
    let mut out = std::io::stdout();
    let _ = write!(out, "\r\x1b[2K");
    let _ = out.flush();
}

impl Transcript for TerminalTranscript {
    fn append(&mut self, speaker: Speaker, text: &str) {
        if self.typing {
            self.hide_typing();
        }
        match speaker {
            Speaker::User => println!("you> {text}"),
            Speaker::Assistant => println!("{}> {text}", self.assistant_name),
            Speaker::Notice => println!("-- {text}"),
        }
    }

    fn show_typing(&mut self) {
        self.typing = true;
        let mut out = std::io::stdout();
        let _ = write!(out, "{} is typing...", self.assistant_name);
        let _ = out.flush();
    }

    fn hide_typing(&mut self) {
        if std::mem::take(&mut self.typing) {
            clear_line();
        }
    }

    fn clear(&mut self) {
        let mut out = std::io::stdout();
        let _ = write!(out, "\x1b[2J\x1b[H");
        let _ = out.flush();
    }

    fn preview(&mut self, text: &str) {
        clear_line();
        let mut out = std::io::stdout();
        let _ = write!(out, "(heard) {text}");
        let _ = out.flush();
    }
}

#[derive(Debug, Default)]
struct Recorded {
    entries: Vec<TranscriptEntry>,
    typing: bool,
    preview: Option<String>,
    clears: usize,
}

/// Records the transcript in memory; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct MemoryTranscript {
    inner: Arc<Mutex<Recorded>>,
}

impl MemoryTranscript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.with(|r| r.entries.clone())
    }

    /// Rendered texts in order
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.with(|r| r.entries.iter().map(|e| e.text.clone()).collect())
    }

    #[must_use]
    pub fn is_typing(&self) -> bool {
        self.with(|r| r.typing)
    }

    #[must_use]
    pub fn preview_text(&self) -> Option<String> {
        self.with(|r| r.preview.clone())
    }

    /// Number of times the transcript was cleared
    #[must_use]
    pub fn clears(&self) -> usize {
        self.with(|r| r.clears)
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        let mut recorded = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut recorded)
    }
}

impl Transcript for MemoryTranscript {
    fn append(&mut self, speaker: Speaker, text: &str) {
        self.with(|r| {
            r.preview = None;
            r.entries.push(TranscriptEntry {
                speaker,
                text: text.to_string(),
            });
        });
    }

    fn show_typing(&mut self) {
        self.with(|r| r.typing = true);
    }

    fn hide_typing(&mut self) {
        self.with(|r| r.typing = false);
    }

    fn clear(&mut self) {
        self.with(|r| {
            r.entries.clear();
            r.preview = None;
            r.clears += 1;
        });
    }

    fn preview(&mut self, text: &str) {
        self.with(|r| r.preview = Some(text.to_string()));
    }
}
