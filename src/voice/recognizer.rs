//! Speech recognition capability
//!
//! A [`Recognizer`] runs one capture session at a time and reports what it
//! hears as [`RecognitionEvent`]s. [`HttpRecognizer`] records the microphone,
//! cuts it into utterances by energy, and sends each one to an STT endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{AudioCapture, SAMPLE_RATE, has_input_device, rms, samples_to_wav};
use crate::config::SpeechConfig;
use crate::{Error, Result};

/// Parameters for one recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub language: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

/// Error codes a recognizer reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorCode {
    /// Microphone access refused
    NotAllowed,
    Network,
    /// Session ended without hearing anything
    NoSpeech,
    Aborted,
    Other(String),
}

/// Raw events from a recognition session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    Result { transcript: String, is_final: bool },
    Error(RecognitionErrorCode),
    /// Capture ended; always the last event of a session
    Ended,
}

/// Speech recognition capability
pub trait Recognizer: Send + Sync {
    /// Begin a session, reporting on `events` until it ends with `Ended`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be started
    fn start(
        &self,
        settings: &RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<()>;

    /// Ask the current session to end
    fn stop(&self);
}

/// Minimum RMS energy counted as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Shortest utterance worth transcribing (0.3s)
const MIN_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 3 / 10;

/// Trailing silence that ends an utterance (0.8s)
const SILENCE_SAMPLES: usize = SAMPLE_RATE as usize * 8 / 10;

/// Longest utterance before it is cut (30s)
const MAX_UTTERANCE_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// Silence after which a single-shot session gives up (8s)
const NO_SPEECH_SAMPLES: usize = SAMPLE_RATE as usize * 8;

/// How often the capture thread drains the microphone buffer
const CAPTURE_POLL: Duration = Duration::from_millis(100);

/// What the segmenter saw in a block of samples
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Nothing but silence so far
    Idle,
    /// Inside an utterance
    Speaking,
    /// An utterance ended; its samples
    Complete(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmenterState {
    Idle,
    Speaking,
}

/// Energy-based utterance segmenter
#[derive(Debug)]
pub struct UtteranceSegmenter {
    state: SegmenterState,
    buffer: Vec<f32>,
    silence: usize,
    idle: usize,
}

impl Default for UtteranceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceSegmenter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silence: 0,
            idle: 0,
        }
    }

    /// Feed a block of 16kHz mono samples
    pub fn process(&mut self, samples: &[f32]) -> Segment {
        if samples.is_empty() {
            return self.current();
        }

        let is_speech = rms(samples) > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence = 0;
                    self.idle = 0;
                    tracing::trace!("speech started");
                } else {
                    self.idle += samples.len();
                }
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                let ended = self.silence > SILENCE_SAMPLES;
                if (ended && self.buffer.len() > MIN_SPEECH_SAMPLES + self.silence)
                    || self.buffer.len() >= MAX_UTTERANCE_SAMPLES
                {
                    let utterance = std::mem::take(&mut self.buffer);
                    tracing::debug!(samples = utterance.len(), "utterance complete");
                    self.reset();
                    return Segment::Complete(utterance);
                }

                if ended {
                    // a click or a cough, not speech
                    tracing::trace!("discarding short noise");
                    self.reset();
                }
            }
        }

        self.current()
    }

    /// Samples of silence heard since the last utterance
    #[must_use]
    pub const fn idle_samples(&self) -> usize {
        self.idle
    }

    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silence = 0;
    }

    fn current(&self) -> Segment {
        match self.state {
            SegmenterState::Idle => Segment::Idle,
            SegmenterState::Speaking => Segment::Speaking,
        }
    }
}

#[derive(serde::Deserialize)]
struct SttResponse {
    text: String,
}

/// Client for the STT endpoint
#[derive(Clone)]
pub struct SttClient {
    client: reqwest::Client,
    url: String,
}

impl SttClient {
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }

    /// Transcribe WAV audio
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply is malformed
    pub async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), language, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("language", language.to_string());

        let response = self.client.post(&self.url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "STT server error");
            return Err(Error::Stt(format!("STT server error {status}: {body}")));
        }

        let result: SttResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text.trim().to_string())
    }
}

/// Microphone plus HTTP STT recognizer
pub struct HttpRecognizer {
    stt: SttClient,
    runtime: tokio::runtime::Handle,
    session: Mutex<Option<Arc<AtomicBool>>>,
}

impl HttpRecognizer {
    /// Check that speech input is enabled and a microphone exists
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if speech input is disabled, no input device exists,
    /// or no runtime is running
    pub fn probe(config: &SpeechConfig) -> Result<Self> {
        if !config.enabled {
            return Err(Error::Unavailable("speech input disabled"));
        }
        if !has_input_device() {
            return Err(Error::Audio("no input device available".to_string()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Speech(format!("no async runtime: {e}")))?;

        tracing::debug!(url = %config.url, "HTTP speech recognizer ready");
        Ok(Self {
            stt: SttClient::new(&config.url),
            runtime,
            session: Mutex::new(None),
        })
    }
}

impl Recognizer for HttpRecognizer {
    fn start(
        &self,
        settings: &RecognitionSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        if let Ok(mut session) = self.session.lock() {
            if let Some(previous) = session.replace(Arc::clone(&stop)) {
                previous.store(true, Ordering::Release);
            }
        }

        let session = CaptureSession {
            stt: self.stt.clone(),
            runtime: self.runtime.clone(),
            settings: settings.clone(),
            stop,
            events,
        };

        std::thread::Builder::new()
            .name("headroom-capture".to_string())
            .spawn(move || session.run())?;
        Ok(())
    }

    fn stop(&self) {
        if let Some(stop) = self.session.lock().ok().and_then(|mut s| s.take()) {
            stop.store(true, Ordering::Release);
        }
    }
}

/// Report a microphone that can't be opened as refused access
fn capture_failure_code(error: &Error) -> RecognitionErrorCode {
    match error {
        Error::Audio(_) | Error::Io(_) => RecognitionErrorCode::NotAllowed,
        other => RecognitionErrorCode::Other(other.to_string()),
    }
}

/// One capture session, run on its own thread
struct CaptureSession {
    stt: SttClient,
    runtime: tokio::runtime::Handle,
    settings: RecognitionSettings,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<RecognitionEvent>,
}

impl CaptureSession {
    fn run(self) {
        let opened = AudioCapture::new().and_then(|mut capture| {
            capture.start()?;
            Ok(capture)
        });

        match opened {
            Ok(mut capture) => {
                self.emit(RecognitionEvent::Started);
                self.listen(&capture);
                capture.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to open microphone");
                self.emit(RecognitionEvent::Error(capture_failure_code(&e)));
            }
        }

        self.emit(RecognitionEvent::Ended);
    }

    fn listen(&self, capture: &AudioCapture) {
        let mut segmenter = UtteranceSegmenter::new();

        while !self.stop.load(Ordering::Acquire) {
            std::thread::sleep(CAPTURE_POLL);

            match segmenter.process(&capture.take_buffer()) {
                Segment::Complete(utterance) => {
                    self.transcribe(&utterance);
                    if !self.settings.continuous {
                        return;
                    }
                }
                Segment::Idle
                    if !self.settings.continuous
                        && segmenter.idle_samples() > NO_SPEECH_SAMPLES =>
                {
                    self.emit(RecognitionEvent::Error(RecognitionErrorCode::NoSpeech));
                    return;
                }
                Segment::Idle | Segment::Speaking => {}
            }
        }

        self.emit(RecognitionEvent::Error(RecognitionErrorCode::Aborted));
    }

    fn transcribe(&self, utterance: &[f32]) {
        let wav = match samples_to_wav(utterance, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                self.emit(RecognitionEvent::Error(RecognitionErrorCode::Other(
                    e.to_string(),
                )));
                return;
            }
        };

        let result = self
            .runtime
            .block_on(self.stt.transcribe(wav, &self.settings.language));

        match result {
            Ok(text) if text.is_empty() => {
                tracing::debug!("empty transcript");
            }
            Ok(transcript) => self.emit(RecognitionEvent::Result {
                transcript,
                is_final: true,
            }),
            Err(Error::Http(e)) => {
                tracing::warn!(error = %e, "STT request failed");
                self.emit(RecognitionEvent::Error(RecognitionErrorCode::Network));
            }
            Err(e) => {
                self.emit(RecognitionEvent::Error(RecognitionErrorCode::Other(
                    e.to_string(),
                )));
            }
        }
    }

    fn emit(&self, event: RecognitionEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| if i % 2 == 0 { 0.2 } else { -0.2 }).collect()
    }

    #[test]
    fn silence_stays_idle() {
        let mut segmenter = UtteranceSegmenter::new();
        assert_eq!(segmenter.process(&[0.0; 1600]), Segment::Idle);
        assert_eq!(segmenter.idle_samples(), 1600);
    }

    #[test]
    fn speech_then_silence_completes() {
        let mut segmenter = UtteranceSegmenter::new();

        assert_eq!(segmenter.process(&tone(8000)), Segment::Speaking);
        assert_eq!(segmenter.process(&[0.0; 8000]), Segment::Speaking);

        match segmenter.process(&[0.0; 8000]) {
            Segment::Complete(samples) => assert_eq!(samples.len(), 24000),
            other => panic!("expected complete utterance, got {other:?}"),
        }
        assert_eq!(segmenter.process(&[0.0; 160]), Segment::Idle);
    }

    #[test]
    fn short_noise_is_discarded() {
        let mut segmenter = UtteranceSegmenter::new();

        assert_eq!(segmenter.process(&tone(800)), Segment::Speaking);
        assert_eq!(segmenter.process(&[0.0; 16000]), Segment::Idle);
    }

    #[test]
    fn long_utterance_is_cut() {
        let mut segmenter = UtteranceSegmenter::new();
        let block = tone(16000);

        for _ in 0..29 {
            assert_eq!(segmenter.process(&block), Segment::Speaking);
        }
        assert!(matches!(segmenter.process(&block), Segment::Complete(_)));
    }

    #[test]
    fn unopenable_microphone_is_refused_access() {
        let missing = Error::Audio("no input device available".to_string());
        assert_eq!(capture_failure_code(&missing), RecognitionErrorCode::NotAllowed);

        let other = Error::Speech("odd".to_string());
        assert!(matches!(capture_failure_code(&other), RecognitionErrorCode::Other(_)));
    }

    #[test]
    fn probe_rejects_disabled_speech() {
        let config = SpeechConfig {
            enabled: false,
            ..SpeechConfig::default()
        };
        assert!(HttpRecognizer::probe(&config).is_err());
    }
}
