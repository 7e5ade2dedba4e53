//! Native speech synthesis fallback
//!
//! [`SpeechSynthesizer`] is the host's built-in speech engine. With the
//! `system-voices` feature, [`SystemSynthesizer`] drives the platform engine
//! (speech-dispatcher, AVFoundation, SAPI) through the `tts` crate.

use crate::Result;

/// A voice offered by the native engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: Option<String>,
}

/// Text plus the speech parameters to render it with
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Option<VoiceInfo>,
    /// Multiplier of the engine's normal rate (0.1 to 10)
    pub rate: f32,
    /// Multiplier of the engine's normal pitch (0 to 2)
    pub pitch: f32,
    /// Fraction of full volume (0 to 1)
    pub volume: f32,
}

/// Native speech synthesis capability
pub trait SpeechSynthesizer: Send + Sync {
    /// Voices the engine offers
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Queue `utterance` for speaking; returns once it is queued
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects the utterance
    fn speak(&self, utterance: &Utterance) -> Result<()>;

    /// Cancel everything queued or speaking
    fn cancel(&self);
}

/// Pick the default voice: a preferred female voice, else the first one
#[must_use]
pub fn preferred_voice(voices: &[VoiceInfo]) -> Option<&VoiceInfo> {
    const PREFERRED: [&str; 3] = ["Female", "Samantha", "Google UK English Female"];

    voices
        .iter()
        .find(|v| PREFERRED.iter().any(|p| v.name.contains(p)))
        .or_else(|| voices.first())
}

#[cfg(feature = "system-voices")]
pub use system::SystemSynthesizer;

#[cfg(feature = "system-voices")]
mod system {
    use std::sync::mpsc;

    use super::{SpeechSynthesizer, Utterance, VoiceInfo};
    use crate::{Error, Result};

    enum Command {
        Speak(Utterance),
        Cancel,
    }

    /// Platform speech engine, owned by a dedicated thread
    pub struct SystemSynthesizer {
        commands: mpsc::Sender<Command>,
        voices: Vec<VoiceInfo>,
    }

    impl SystemSynthesizer {
        /// Start the platform engine
        ///
        /// # Errors
        ///
        /// Returns error if the platform engine cannot be initialized
        pub fn new() -> Result<Self> {
            let (commands, rx) = mpsc::channel::<Command>();
            let (init_tx, init_rx) = mpsc::channel::<Result<Vec<VoiceInfo>>>();

            std::thread::spawn(move || {
                let mut engine = match tts::Tts::default() {
                    Ok(engine) => engine,
                    Err(e) => {
                        let _ = init_tx.send(Err(Error::Tts(format!(
                            "failed to initialize system TTS: {e}"
                        ))));
                        return;
                    }
                };

                let voices = engine.voices().unwrap_or_default();
                let infos = voices
                    .iter()
                    .map(|v| VoiceInfo {
                        id: v.id(),
                        name: v.name(),
                        language: Some(v.language().to_string()),
                    })
                    .collect();
                let _ = init_tx.send(Ok(infos));

                for command in rx {
                    match command {
                        Command::Speak(utterance) => {
                            apply(&mut engine, &voices, &utterance);
                            if let Err(e) = engine.speak(utterance.text, false) {
                                tracing::warn!(error = %e, "system TTS failed to speak");
                            }
                        }
                        Command::Cancel => {
                            if let Err(e) = engine.stop() {
                                tracing::debug!(error = %e, "system TTS stop failed");
                            }
                        }
                    }
                }
            });

            let voices = init_rx
                .recv()
                .map_err(|_| Error::Tts("system TTS thread exited".to_string()))??;
            tracing::debug!(voices = voices.len(), "system TTS initialized");

            Ok(Self { commands, voices })
        }
    }

    /// Map utterance multipliers onto the engine's native ranges
    fn apply(engine: &mut tts::Tts, voices: &[tts::Voice], utterance: &Utterance) {
        let features = engine.supported_features();

        if features.rate {
            let rate = (engine.normal_rate() * utterance.rate)
                .clamp(engine.min_rate(), engine.max_rate());
            let _ = engine.set_rate(rate);
        }
        if features.pitch {
            let pitch = (engine.normal_pitch() * utterance.pitch)
                .clamp(engine.min_pitch(), engine.max_pitch());
            let _ = engine.set_pitch(pitch);
        }
        if features.volume {
            let volume = engine.min_volume()
                + (engine.max_volume() - engine.min_volume()) * utterance.volume;
            let _ = engine.set_volume(volume);
        }
        if features.voice {
            if let Some(wanted) = &utterance.voice {
                if let Some(voice) = voices.iter().find(|v| v.id() == wanted.id) {
                    let _ = engine.set_voice(voice);
                }
            }
        }
    }

    impl SpeechSynthesizer for SystemSynthesizer {
        fn voices(&self) -> Vec<VoiceInfo> {
            self.voices.clone()
        }

        fn speak(&self, utterance: &Utterance) -> Result<()> {
            self.commands
                .send(Command::Speak(utterance.clone()))
                .map_err(|_| Error::Tts("system TTS thread exited".to_string()))
        }

        fn cancel(&self) {
            let _ = self.commands.send(Command::Cancel);
        }
    }
}
