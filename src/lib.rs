//! Headroom - voice-capable chat client for a local LLM server
//!
//! This library provides the pieces the `headroom` binary is built from:
//! - Chat with an Ollama-compatible `/api/chat` endpoint
//! - Spoken replies through a remote TTS server, falling back to native voices
//! - Spoken input through the microphone and an STT endpoint
//! - A static server for the page assets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Front-end (REPL)                   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 ChatController                       │
//! │   History  │  Transcript  │  Chat client            │
//! └──────────┬─────────────────────────┬────────────────┘
//!            │                         │
//! ┌──────────▼──────────┐   ┌──────────▼────────────────┐
//! │   SpeechHandler     │   │        TtsHandler          │
//! │ mic -> STT          │   │ remote TTS -> native voice │
//! └─────────────────────┘   └───────────────────────────┘
//! ```

pub mod capabilities;
pub mod chat;
pub mod config;
pub mod error;
pub mod server;
pub mod voice;

pub use capabilities::{Capabilities, Capability};
pub use chat::{ChatBackend, ChatController, ConversationHistory, Message, OllamaClient, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use server::StaticServer;
pub use voice::{SpeechEvent, SpeechHandler, TtsHandler};
