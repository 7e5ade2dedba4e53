//! Conversation with the chat endpoint
//!
//! Holds the conversation history, the HTTP client for the Ollama chat API,
//! the rendered transcript, and the [`ChatController`] that ties them to
//! speech input and output.

mod client;
mod controller;
mod transcript;

use serde::{Deserialize, Serialize};

pub use client::{ChatBackend, OllamaClient};
pub use controller::{ChatController, Outcome, Reply, TEST_VOICE_TEXT};
pub use transcript::{MemoryTranscript, Speaker, TerminalTranscript, Transcript, TranscriptEntry};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered conversation, always starting with the system prompt
///
/// Append-only until [`reset`](Self::reset), which returns it to the
/// system prompt followed by the assistant's welcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationHistory {
    system_prompt: String,
    welcome: String,
    messages: Vec<Message>,
}

impl ConversationHistory {
    #[must_use]
    pub fn new(system_prompt: &str, welcome: &str) -> Self {
        let mut history = Self {
            system_prompt: system_prompt.to_string(),
            welcome: welcome.to_string(),
            messages: Vec::new(),
        };
        history.reset();
        history
    }

    /// Reinitialise to `[system, assistant-welcome]`
    pub fn reset(&mut self) {
        self.messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::assistant(self.welcome.clone()),
        ];
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true; the system prompt is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
