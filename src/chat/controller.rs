//! Chat controller
//!
//! Owns the conversation history and the transcript, sends messages to the
//! chat backend, and wires replies to speech output and speech input to
//! messages.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use super::client::ChatBackend;
use super::transcript::{Speaker, Transcript};
use super::{ConversationHistory, Message};
use crate::config::ChatConfig;
use crate::voice::{SpeechError, SpeechEvent, SpeechHandler, TtsHandler};

/// Sample spoken by [`ChatController::test_voice`]
pub const TEST_VOICE_TEXT: &str =
    "This is a test of the text-to-speech system. How does this voice sound?";

/// How a message exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Replied,
    /// The chat server could not be reached or answered badly
    Failed,
}

/// The assistant turn produced by [`ChatController::send_message`]
#[derive(Debug)]
pub struct Reply {
    pub content: String,
    pub outcome: Outcome,
    /// Speech of the reply, when audio responses are on
    pub speech: Option<JoinHandle<bool>>,
}

#[derive(Debug, Default)]
struct ForcedState {
    depth: usize,
    restore: bool,
}

/// Keeps TTS enabled while alive, then restores the state from before the
/// outermost guard, even when the speech task fails or panics
struct ForceEnabled {
    tts: Arc<TtsHandler>,
    state: Arc<Mutex<ForcedState>>,
}

impl ForceEnabled {
    fn new(tts: &Arc<TtsHandler>, state: &Arc<Mutex<ForcedState>>) -> Self {
        let mut forced = state.lock().unwrap_or_else(PoisonError::into_inner);
        if forced.depth == 0 {
            forced.restore = tts.enabled();
        }
        forced.depth += 1;
        tts.set_enabled(true);
        drop(forced);

        Self {
            tts: Arc::clone(tts),
            state: Arc::clone(state),
        }
    }
}

impl Drop for ForceEnabled {
    fn drop(&mut self) {
        let mut forced = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        forced.depth = forced.depth.saturating_sub(1);
        if forced.depth == 0 {
            self.tts.set_enabled(forced.restore);
        }
    }
}

/// Drives one conversation
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    transcript: Box<dyn Transcript>,
    history: ConversationHistory,
    tts: Arc<TtsHandler>,
    speech: Option<Arc<SpeechHandler>>,
    audio_enabled: bool,
    forced: Arc<Mutex<ForcedState>>,
    pending_input: String,
}

impl ChatController {
    /// Start a conversation and render its welcome
    pub fn new(
        config: &ChatConfig,
        backend: Arc<dyn ChatBackend>,
        mut transcript: Box<dyn Transcript>,
        tts: Arc<TtsHandler>,
    ) -> Self {
        let history = ConversationHistory::new(&config.system_prompt, &config.welcome_message);
        transcript.append(Speaker::Assistant, history.welcome());

        Self {
            backend,
            transcript,
            history,
            audio_enabled: tts.enabled(),
            tts,
            speech: None,
            forced: Arc::new(Mutex::new(ForcedState::default())),
            pending_input: String::new(),
        }
    }

    /// Attach speech input
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<SpeechHandler>) -> Self {
        self.speech = Some(speech);
        self
    }

    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub const fn audio_enabled(&self) -> bool {
        self.audio_enabled
    }

    #[must_use]
    pub const fn tts(&self) -> &Arc<TtsHandler> {
        &self.tts
    }

    #[must_use]
    pub const fn speech(&self) -> Option<&Arc<SpeechHandler>> {
        self.speech.as_ref()
    }

    /// Speech input heard but not yet sent
    #[must_use]
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    #[must_use]
    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// Send a user message and render the reply
    ///
    /// Returns `None` without touching anything when `text` is blank.
    pub async fn send_message(&mut self, text: &str) -> Option<Reply> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.tts.stop_speaking();
        self.transcript.append(Speaker::User, text);
        self.history.push(Message::user(text));
        self.transcript.show_typing();

        let result = self.backend.complete(self.history.messages()).await;
        self.transcript.hide_typing();

        let (content, outcome) = match result {
            Ok(content) => (content, Outcome::Replied),
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                (self.error_reply(), Outcome::Failed)
            }
        };

        self.history.push(Message::assistant(content.clone()));
        self.transcript.append(Speaker::Assistant, &content);

        let speech = (outcome == Outcome::Replied && self.audio_enabled)
            .then(|| self.spawn_speech(content.clone()));

        Some(Reply {
            content,
            outcome,
            speech,
        })
    }

    /// Start over from the welcome message, speaking it
    ///
    /// TTS is forced on for the welcome; the returned task restores the
    /// previous enabled state when it finishes.
    pub fn reset_conversation(&mut self) -> JoinHandle<bool> {
        self.tts.stop_speaking();
        self.history.reset();
        self.pending_input.clear();

        self.transcript.clear();
        self.transcript
            .append(Speaker::Assistant, self.history.welcome());
        tracing::debug!("conversation reset");

        self.spawn_forced_speech(self.history.welcome().to_string())
    }

    /// Flip audio responses, announcing the change
    pub fn toggle_audio(&mut self) -> Option<JoinHandle<bool>> {
        self.audio_enabled = !self.audio_enabled;
        self.tts.set_enabled(self.audio_enabled);
        {
            // forced speech in flight restores to the new preference
            let mut forced = self.forced.lock().unwrap_or_else(PoisonError::into_inner);
            if forced.depth > 0 {
                forced.restore = self.audio_enabled;
            }
        }

        if self.audio_enabled {
            let notice = format!("Audio responses enabled. Using {}.", self.tts.backend_label());
            self.transcript.append(Speaker::Notice, &notice);
            Some(self.spawn_speech(notice))
        } else {
            self.tts.stop_speaking();
            self.transcript
                .append(Speaker::Notice, "Audio responses disabled.");
            None
        }
    }

    /// Speak a sample through the current backend
    pub fn test_voice(&self) -> JoinHandle<bool> {
        self.spawn_forced_speech(TEST_VOICE_TEXT.to_string())
    }

    /// Toggle speech input; false when there is none
    pub fn toggle_listening(&mut self) -> bool {
        let Some(speech) = &self.speech else {
            self.transcript
                .append(Speaker::Notice, "Speech recognition is not available.");
            return false;
        };
        let listening = speech.toggle_listening();
        if listening {
            self.pending_input.clear();
        }
        listening
    }

    /// React to speech input
    ///
    /// Returns the reply when the event completed a spoken message.
    pub async fn handle_speech_event(&mut self, event: SpeechEvent) -> Option<Reply> {
        match event {
            SpeechEvent::Started => {
                tracing::debug!("listening for speech");
                None
            }
            SpeechEvent::InterimResult(text) => {
                let preview = join_words(&self.pending_input, &text);
                self.transcript.preview(&preview);
                None
            }
            SpeechEvent::Result(text) => {
                self.pending_input = join_words(&self.pending_input, &text);
                self.transcript.preview(&self.pending_input);
                None
            }
            SpeechEvent::Stopped => {
                let text = std::mem::take(&mut self.pending_input);
                self.send_message(&text).await
            }
            SpeechEvent::Error(error @ (SpeechError::PermissionDenied | SpeechError::Network)) => {
                self.transcript.append(
                    Speaker::Notice,
                    &format!("Speech recognition error: {error}"),
                );
                None
            }
            SpeechEvent::Error(SpeechError::Other(detail)) => {
                tracing::warn!(%detail, "speech recognition error");
                None
            }
        }
    }

    fn error_reply(&self) -> String {
        format!(
            "Sorry, I encountered an error connecting to the chat server. Please make sure Ollama is running locally with the {} model.",
            self.backend.model()
        )
    }

    fn spawn_speech(&self, text: String) -> JoinHandle<bool> {
        let tts = Arc::clone(&self.tts);
        tokio::spawn(async move { tts.speak(&text).await })
    }

    fn spawn_forced_speech(&self, text: String) -> JoinHandle<bool> {
        let guard = ForceEnabled::new(&self.tts, &self.forced);
        let tts = Arc::clone(&self.tts);
        tokio::spawn(async move {
            let _guard = guard;
            tts.speak(&text).await
        })
    }
}

fn join_words(head: &str, tail: &str) -> String {
    match (head.trim(), tail.trim()) {
        ("", tail) => tail.to_string(),
        (head, "") => head.to_string(),
        (head, tail) => format!("{head} {tail}"),
    }
}
