//! Error types for Headroom

use thiserror::Error;

/// Result type alias for Headroom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Headroom
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Chat endpoint error (non-2xx status, malformed reply)
    #[error("chat error: {0}")]
    Chat(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition error
    #[error("speech error: {0}")]
    Speech(String),

    /// A newer request took over while this one was in flight
    #[error("request {0} superseded")]
    Superseded(u64),

    /// A host capability is not present
    #[error("capability unavailable: {0}")]
    Unavailable(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error only reports that a newer request won
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded(_))
    }
}
