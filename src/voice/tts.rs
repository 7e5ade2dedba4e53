//! Text-to-speech (TTS) handler
//!
//! Speaks text through the best available backend: the remote TTS server
//! first, then the native speech engine. Every request takes a generation
//! ticket, and only the most recent request ever reaches the speakers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::generation::{Generation, Ticket};
use super::media::{AudioOutput, MediaResource, ReadyState};
use super::remote::{SynthesisRequest, TtsBackend};
use super::synthesis::{SpeechSynthesizer, Utterance, VoiceInfo, preferred_voice};
use crate::capabilities::Capability;
use crate::config::TtsConfig;
use crate::{Error, Result};

/// Allowed speech rate multipliers
pub const RATE_RANGE: (f32, f32) = (0.1, 10.0);

/// Allowed pitch multipliers
pub const PITCH_RANGE: (f32, f32) = (0.0, 2.0);

/// Allowed volume fractions
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);

/// How long to wait for decoded audio before giving up
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    /// Delay between readiness checks
    pub interval: Duration,
    /// Maximum number of checks
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 50,
        }
    }
}

/// Selects a native voice by position or by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceSelector {
    Index(usize),
    /// Case-insensitive substring of the voice name
    Name(String),
}

/// Mutable TTS settings
#[derive(Debug, Clone, PartialEq)]
pub struct TtsSettings {
    pub remote_enabled: bool,
    pub use_builtin_fallback: bool,
    pub model: String,
    pub speaker: String,
    pub remote_voice: String,
    pub voice: Option<VoiceInfo>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// The resource currently playing and the request that owns it
struct ActivePlayback {
    ticket: Ticket,
    resource: Box<dyn MediaResource>,
}

/// Speaks text, keeping only the latest request audible
pub struct TtsHandler {
    enabled: AtomicBool,
    settings: RwLock<TtsSettings>,
    generation: Generation,
    active: Mutex<Option<ActivePlayback>>,
    remote: Option<Arc<dyn TtsBackend>>,
    output: Capability<Arc<dyn AudioOutput>>,
    synthesis: Capability<Arc<dyn SpeechSynthesizer>>,
    voices: Vec<VoiceInfo>,
    readiness: ReadinessPolicy,
}

impl TtsHandler {
    /// Create a handler from configuration and the host's capabilities
    #[must_use]
    pub fn new(
        config: &TtsConfig,
        remote: Option<Arc<dyn TtsBackend>>,
        output: Capability<Arc<dyn AudioOutput>>,
        synthesis: Capability<Arc<dyn SpeechSynthesizer>>,
    ) -> Self {
        let voices = synthesis.get().map(|s| s.voices()).unwrap_or_default();
        let voice = preferred_voice(&voices).cloned();
        if let Some(v) = &voice {
            tracing::debug!(voice = %v.name, available = voices.len(), "selected native voice");
        }

        let settings = TtsSettings {
            remote_enabled: config.remote_enabled,
            use_builtin_fallback: config.use_builtin_fallback,
            model: config.model.clone(),
            speaker: config.speaker.clone(),
            remote_voice: config.voice.clone(),
            voice,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        };

        Self {
            enabled: AtomicBool::new(config.enabled),
            settings: RwLock::new(settings),
            generation: Generation::new(),
            active: Mutex::new(None),
            remote,
            output,
            synthesis,
            voices,
            readiness: ReadinessPolicy {
                interval: config.readiness_interval,
                max_attempts: config.readiness_attempts.max(1),
            },
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable speech; in-flight audio is left alone
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.store(enabled, Ordering::Release);
        tracing::debug!(enabled, "TTS enabled state changed");
        enabled
    }

    /// Snapshot of the current settings
    #[must_use]
    pub fn settings(&self) -> TtsSettings {
        self.read_settings().clone()
    }

    /// Native voices known to the handler
    #[must_use]
    pub fn voices(&self) -> &[VoiceInfo] {
        &self.voices
    }

    /// Id of the most recent request
    #[must_use]
    pub fn current_request_id(&self) -> u64 {
        self.generation.current()
    }

    /// Whether a resource is currently attached for playback
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.active.lock().is_ok_and(|slot| slot.is_some())
    }

    /// Name of the backend a `speak` would try first
    #[must_use]
    pub fn backend_label(&self) -> String {
        let settings = self.read_settings();
        if settings.remote_enabled && self.output.is_available() {
            if let Some(remote) = &self.remote {
                return remote.name().to_string();
            }
        }
        if settings.use_builtin_fallback && self.synthesis.is_available() {
            return "built-in speech synthesis".to_string();
        }
        "no speech backend".to_string()
    }

    /// Speak `text`, returning whether any backend produced speech
    ///
    /// Stops whatever is playing first. A newer `speak` or `stop_speaking`
    /// supersedes this call, which then returns without side effects.
    pub async fn speak(&self, text: &str) -> bool {
        if !self.enabled() || text.trim().is_empty() {
            return false;
        }

        let ticket = self.begin_request();
        tracing::debug!(id = ticket.id(), chars = text.len(), "speak request");

        let remote_enabled = self.read_settings().remote_enabled;
        if remote_enabled {
            match self.speak_remote(text, ticket).await {
                Ok(()) => return true,
                Err(e) if e.is_superseded() => {
                    tracing::debug!(id = ticket.id(), "request superseded");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(id = ticket.id(), error = %e, "remote TTS failed, falling back");
                }
            }
        }

        self.speak_native(text, ticket)
    }

    /// Invalidate in-flight requests and release any playing audio
    pub fn stop_speaking(&self) {
        self.generation.invalidate();
        self.silence();
        tracing::debug!(id = self.generation.current(), "speech stopped");
    }

    /// Stop playback and open a new request
    fn begin_request(&self) -> Ticket {
        let ticket = self.generation.advance();
        self.silence();
        ticket
    }

    /// Stop both backends: release the media slot and cancel native speech
    fn silence(&self) {
        self.release_active();
        if let Some(synth) = self.synthesis.get() {
            synth.cancel();
        }
    }

    fn release_active(&self) {
        let previous = self.active.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut playback) = previous {
            tracing::debug!(id = playback.ticket.id(), "releasing active audio");
            playback.resource.stop();
        }
    }

    async fn speak_remote(&self, text: &str, ticket: Ticket) -> Result<()> {
        let remote = self
            .remote
            .as_ref()
            .ok_or(Error::Unavailable("remote TTS"))?;
        let output = self
            .output
            .get()
            .ok_or(Error::Unavailable("audio output"))?;

        remote.health().await?;
        self.generation.check(ticket)?;

        let request = self.synthesis_request(text);
        let audio = remote.synthesize(&request).await?;
        self.generation.check(ticket)?;

        let resource = output.load(audio)?;
        let resource = self.wait_until_ready(resource, ticket).await?;
        self.start_playback(ticket, resource)?;

        tracing::debug!(id = ticket.id(), "remote audio playing");
        self.wait_until_ended(ticket).await;
        Ok(())
    }

    fn synthesis_request(&self, text: &str) -> SynthesisRequest {
        let settings = self.read_settings();
        SynthesisRequest {
            text: text.to_string(),
            model: settings.model.clone(),
            speaker: settings.speaker.clone(),
            voice: Some(settings.remote_voice.clone()).filter(|v| !v.is_empty()),
            speed: settings.rate,
        }
    }

    /// Poll readiness at a fixed interval, up to the configured cap
    async fn wait_until_ready(
        &self,
        resource: Box<dyn MediaResource>,
        ticket: Ticket,
    ) -> Result<Box<dyn MediaResource>> {
        for attempt in 1..=self.readiness.max_attempts {
            self.generation.check(ticket)?;
            if resource.ready_state()? >= ReadyState::HaveEnoughData {
                tracing::trace!(id = ticket.id(), attempt, "audio ready");
                return Ok(resource);
            }
            tokio::time::sleep(self.readiness.interval).await;
        }

        Err(Error::Tts(format!(
            "audio not ready after {} checks",
            self.readiness.max_attempts
        )))
    }

    fn start_playback(&self, ticket: Ticket, mut resource: Box<dyn MediaResource>) -> Result<()> {
        let mut slot = self
            .active
            .lock()
            .map_err(|_| Error::Tts("playback slot poisoned".to_string()))?;

        // checked under the slot lock so stop_speaking can't slip in between
        self.generation.check(ticket)?;

        if let Some(mut previous) = slot.take() {
            previous.resource.stop();
        }
        resource.play()?;
        *slot = Some(ActivePlayback { ticket, resource });
        Ok(())
    }

    /// Wait for this request's audio to finish, then release it
    async fn wait_until_ended(&self, ticket: Ticket) {
        loop {
            let finished = match self.active.lock() {
                Ok(mut slot) => match slot.as_ref() {
                    Some(playback) if playback.ticket == ticket => {
                        let ended = playback.resource.is_ended();
                        if ended {
                            slot.take();
                        }
                        ended
                    }
                    // released by a newer request or stop_speaking
                    _ => true,
                },
                Err(_) => true,
            };

            if finished {
                tracing::debug!(id = ticket.id(), "playback finished");
                return;
            }
            tokio::time::sleep(self.readiness.interval).await;
        }
    }

    fn speak_native(&self, text: &str, ticket: Ticket) -> bool {
        if !self.generation.is_current(ticket) {
            return false;
        }

        let settings = self.settings();
        if !settings.use_builtin_fallback {
            tracing::error!("no TTS method available");
            return false;
        }
        let Some(synth) = self.synthesis.get() else {
            tracing::error!("no TTS method available");
            return false;
        };

        let utterance = Utterance {
            text: text.to_string(),
            voice: settings.voice,
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        };

        match synth.speak(&utterance) {
            Ok(()) => {
                tracing::debug!(id = ticket.id(), "speaking with native synthesis");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "native synthesis failed");
                false
            }
        }
    }

    /// Set the speech rate multiplier (0.1 to 10)
    pub fn set_rate(&self, rate: f32) -> bool {
        self.update_if(in_range(rate, RATE_RANGE), |s| s.rate = rate)
    }

    /// Set the pitch multiplier (0 to 2)
    pub fn set_pitch(&self, pitch: f32) -> bool {
        self.update_if(in_range(pitch, PITCH_RANGE), |s| s.pitch = pitch)
    }

    /// Set the volume (0 to 1)
    pub fn set_volume(&self, volume: f32) -> bool {
        self.update_if(in_range(volume, VOLUME_RANGE), |s| s.volume = volume)
    }

    /// Set the remote model
    pub fn set_model(&self, model: &str) -> bool {
        let model = model.trim();
        self.update_if(!model.is_empty(), |s| s.model = model.to_string())
    }

    /// Set the remote speaker
    pub fn set_speaker(&self, speaker: &str) -> bool {
        let speaker = speaker.trim();
        self.update_if(!speaker.is_empty(), |s| s.speaker = speaker.to_string())
    }

    /// Set the remote voice/language identifier
    pub fn set_remote_voice(&self, voice: &str) -> bool {
        let voice = voice.trim();
        self.update_if(!voice.is_empty(), |s| s.remote_voice = voice.to_string())
    }

    /// Select a native voice by index or name
    pub fn set_voice(&self, selector: &VoiceSelector) -> bool {
        let found = match selector {
            VoiceSelector::Index(i) => self.voices.get(*i),
            VoiceSelector::Name(name) => {
                let needle = name.to_lowercase();
                self.voices
                    .iter()
                    .find(|v| v.name.to_lowercase().contains(&needle))
            }
        };

        match found.cloned() {
            Some(voice) => self.update_if(true, |s| s.voice = Some(voice)),
            None => false,
        }
    }

    /// Toggle the remote backend
    pub fn set_remote_enabled(&self, enabled: bool) -> bool {
        self.update_if(true, |s| s.remote_enabled = enabled)
    }

    /// Toggle the native fallback
    pub fn set_builtin_fallback(&self, enabled: bool) -> bool {
        self.update_if(true, |s| s.use_builtin_fallback = enabled)
    }

    fn update_if(&self, valid: bool, apply: impl FnOnce(&mut TtsSettings)) -> bool {
        if !valid {
            return false;
        }
        match self.settings.write() {
            Ok(mut settings) => {
                apply(&mut settings);
                true
            }
            Err(_) => false,
        }
    }

    fn read_settings(&self) -> std::sync::RwLockReadGuard<'_, TtsSettings> {
        self.settings
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn in_range(value: f32, (min, max): (f32, f32)) -> bool {
    value.is_finite() && value >= min && value <= max
}
