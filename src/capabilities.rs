//! Host capability detection
//!
//! Speech recognition, speech synthesis and audio output are probed once at
//! startup. A missing capability disables its feature up front rather than
//! failing later at runtime.

use std::sync::Arc;

use crate::config::Config;
use crate::voice::{AudioOutput, CpalOutput, HttpRecognizer, Recognizer, SpeechSynthesizer};

/// A host capability that may or may not be present
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Available(T),
    Unavailable,
}

impl<T> Capability<T> {
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Borrow the capability if present
    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable => None,
        }
    }

    /// Convert a probe result, logging why the capability is missing
    pub fn from_probe<E: std::fmt::Display>(name: &str, probe: Result<T, E>) -> Self {
        match probe {
            Ok(value) => {
                tracing::debug!(capability = name, "capability available");
                Self::Available(value)
            }
            Err(e) => {
                tracing::info!(capability = name, reason = %e, "capability unavailable");
                Self::Unavailable
            }
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unavailable, Self::Available)
    }
}

/// Everything the host can do, detected once
#[derive(Clone)]
pub struct Capabilities {
    pub recognition: Capability<Arc<dyn Recognizer>>,
    pub synthesis: Capability<Arc<dyn SpeechSynthesizer>>,
    pub audio_output: Capability<Arc<dyn AudioOutput>>,
}

impl Capabilities {
    /// Probe the host
    #[must_use]
    pub fn detect(config: &Config) -> Self {
        let audio_output = Capability::from_probe(
            "audio output",
            CpalOutput::new().map(|o| Arc::new(o) as Arc<dyn AudioOutput>),
        );

        let recognition = if config.speech.use_builtin_fallback {
            Capability::from_probe(
                "speech recognition",
                HttpRecognizer::probe(&config.speech).map(|r| Arc::new(r) as Arc<dyn Recognizer>),
            )
        } else {
            Capability::Unavailable
        };

        Self {
            recognition,
            synthesis: detect_synthesis(),
            audio_output,
        }
    }
}

#[cfg(feature = "system-voices")]
fn detect_synthesis() -> Capability<Arc<dyn SpeechSynthesizer>> {
    Capability::from_probe(
        "speech synthesis",
        crate::voice::SystemSynthesizer::new().map(|s| Arc::new(s) as Arc<dyn SpeechSynthesizer>),
    )
}

#[cfg(not(feature = "system-voices"))]
fn detect_synthesis() -> Capability<Arc<dyn SpeechSynthesizer>> {
    tracing::debug!("built without system-voices, speech synthesis unavailable");
    Capability::Unavailable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_conversion() {
        let present: Capability<u8> = Some(3).into();
        assert_eq!(present.get(), Some(&3));

        let absent: Capability<u8> = None.into();
        assert!(!absent.is_available());
    }

    #[test]
    fn probe_error_is_unavailable() {
        let cap: Capability<u8> = Capability::from_probe("test", Err::<u8, _>("no device"));
        assert!(cap.get().is_none());
    }
}
