//! Speech recognition lifecycle
//!
//! [`SpeechHandler`] drives a [`Recognizer`] through `Idle -> Listening ->
//! Idle`, restarts continuous sessions that end on their own (a bounded
//! number of times), and turns raw recognizer events into [`SpeechEvent`]s.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;

use super::recognizer::{RecognitionErrorCode, RecognitionEvent, RecognitionSettings, Recognizer};
use crate::capabilities::Capability;
use crate::config::SpeechConfig;

/// Languages offered for recognition, as (code, display name)
pub const SUPPORTED_LANGUAGES: [(&str, &str); 11] = [
    ("en-US", "English (US)"),
    ("en-GB", "English (UK)"),
    ("es-ES", "Spanish"),
    ("fr-FR", "French"),
    ("de-DE", "German"),
    ("it-IT", "Italian"),
    ("ja-JP", "Japanese"),
    ("ko-KR", "Korean"),
    ("zh-CN", "Chinese (Simplified)"),
    ("zh-TW", "Chinese (Traditional)"),
    ("ru-RU", "Russian"),
];

/// Errors surfaced to the chat surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    PermissionDenied,
    Network,
    Other(String),
}

impl std::fmt::Display for SpeechError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("microphone access was denied"),
            Self::Network => f.write_str("network error"),
            Self::Other(detail) => f.write_str(detail),
        }
    }
}

/// Events raised by [`SpeechHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started,
    Stopped,
    /// Final transcript of one utterance
    Result(String),
    InterimResult(String),
    Error(SpeechError),
}

#[derive(Debug)]
struct Session {
    /// A recognizer session is running
    listening: bool,
    /// Restart when the running session ends on its own
    armed: bool,
    restart_pending: bool,
    restart_count: u32,
    /// Bumped on every start and stop; stale restart timers compare against it
    epoch: u64,
    language: String,
    continuous: bool,
}

/// Speech recognition state machine
pub struct SpeechHandler {
    recognizer: Capability<Arc<dyn Recognizer>>,
    session: Mutex<Session>,
    interim_results: bool,
    max_alternatives: u32,
    max_restarts: u32,
    restart_pause: Duration,
    events: mpsc::UnboundedSender<SpeechEvent>,
    recognition: mpsc::UnboundedSender<RecognitionEvent>,
}

impl SpeechHandler {
    /// Create the handler and spawn its event pump
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        config: &SpeechConfig,
        recognizer: Capability<Arc<dyn Recognizer>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SpeechEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (recognition, mut recognition_rx) = mpsc::unbounded_channel();

        let handler = Arc::new(Self {
            recognizer,
            session: Mutex::new(Session {
                listening: false,
                armed: false,
                restart_pending: false,
                restart_count: 0,
                epoch: 0,
                language: config.language.clone(),
                continuous: config.continuous,
            }),
            interim_results: config.interim_results,
            max_alternatives: config.max_alternatives,
            max_restarts: config.max_restarts,
            restart_pause: config.restart_pause,
            events,
            recognition,
        });

        let weak = Arc::downgrade(&handler);
        tokio::spawn(async move {
            while let Some(event) = recognition_rx.recv().await {
                let Some(handler) = weak.upgrade() else {
                    break;
                };
                handler.on_recognition(event);
            }
            tracing::trace!("speech event pump finished");
        });

        (handler, events_rx)
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.with_session(|s| s.listening)
    }

    /// Listening or about to restart
    fn is_active(&self) -> bool {
        self.with_session(|s| s.listening || s.restart_pending)
    }

    #[must_use]
    pub fn language(&self) -> String {
        self.with_session(|s| s.language.clone())
    }

    #[must_use]
    pub fn continuous(&self) -> bool {
        self.with_session(|s| s.continuous)
    }

    #[must_use]
    pub const fn supported_languages() -> &'static [(&'static str, &'static str)] {
        &SUPPORTED_LANGUAGES
    }

    /// Start a recognition session
    ///
    /// Returns false when already listening, a restart is pending, or no
    /// recognizer is available.
    pub fn start_listening(&self) -> bool {
        let Some(recognizer) = self.recognizer.get() else {
            tracing::debug!("speech recognition unavailable");
            return false;
        };

        let Ok(mut session) = self.session.lock() else {
            return false;
        };
        if session.listening || session.restart_pending {
            return false;
        }

        session.restart_count = 0;
        session.armed = session.continuous;
        session.epoch += 1;

        let settings = self.settings(&session);
        match recognizer.start(&settings, self.recognition.clone()) {
            Ok(()) => {
                session.listening = true;
                tracing::debug!(language = %settings.language, continuous = settings.continuous, "listening");
                true
            }
            Err(e) => {
                session.armed = false;
                drop(session);
                tracing::warn!(error = %e, "failed to start recognition");
                self.emit(SpeechEvent::Error(SpeechError::Other(e.to_string())));
                false
            }
        }
    }

    /// Stop listening; `Stopped` follows once capture has ended
    ///
    /// Returns false when there was nothing to stop.
    pub fn stop_listening(&self) -> bool {
        let Ok(mut session) = self.session.lock() else {
            return false;
        };

        session.armed = false;
        session.epoch += 1;

        if session.restart_pending {
            session.restart_pending = false;
            drop(session);
            tracing::debug!("pending restart cancelled");
            self.emit(SpeechEvent::Stopped);
            return true;
        }

        if !session.listening {
            return false;
        }
        drop(session);

        if let Some(recognizer) = self.recognizer.get() {
            recognizer.stop();
        }
        true
    }

    /// Stop if active, otherwise start; returns whether listening is now intended
    pub fn toggle_listening(&self) -> bool {
        if self.is_active() {
            self.stop_listening();
            false
        } else {
            self.start_listening()
        }
    }

    /// Set the recognition language for subsequent sessions
    pub fn set_language(&self, code: &str) -> bool {
        let code = code.trim();
        if !self.recognizer.is_available() || code.is_empty() {
            return false;
        }
        self.session
            .lock()
            .map(|mut s| s.language = code.to_string())
            .is_ok()
    }

    /// Set continuous mode for subsequent sessions
    pub fn set_continuous(&self, continuous: bool) {
        if let Ok(mut session) = self.session.lock() {
            session.continuous = continuous;
        }
    }

    fn on_recognition(self: &Arc<Self>, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => self.emit(SpeechEvent::Started),
            RecognitionEvent::Result {
                transcript,
                is_final: true,
            } => {
                if let Ok(mut session) = self.session.lock() {
                    session.restart_count = 0;
                }
                self.emit(SpeechEvent::Result(transcript));
            }
            RecognitionEvent::Result {
                transcript,
                is_final: false,
            } => self.emit(SpeechEvent::InterimResult(transcript)),
            RecognitionEvent::Error(code) => self.on_error(code),
            RecognitionEvent::Ended => self.on_ended(),
        }
    }

    fn on_error(&self, code: RecognitionErrorCode) {
        match code {
            RecognitionErrorCode::NotAllowed => {
                if let Ok(mut session) = self.session.lock() {
                    session.armed = false;
                }
                tracing::warn!("microphone permission denied");
                self.emit(SpeechEvent::Error(SpeechError::PermissionDenied));
            }
            RecognitionErrorCode::Network => {
                self.emit(SpeechEvent::Error(SpeechError::Network));
            }
            RecognitionErrorCode::NoSpeech | RecognitionErrorCode::Aborted => {
                tracing::trace!(?code, "recognition error ignored");
            }
            RecognitionErrorCode::Other(detail) => {
                self.emit(SpeechEvent::Error(SpeechError::Other(detail)));
            }
        }
    }

    fn on_ended(self: &Arc<Self>) {
        let Ok(mut session) = self.session.lock() else {
            return;
        };
        session.listening = false;

        if !session.armed {
            drop(session);
            self.emit(SpeechEvent::Stopped);
            return;
        }

        if session.restart_count >= self.max_restarts {
            session.armed = false;
            let attempts = session.restart_count;
            drop(session);
            tracing::info!(attempts, "speech recognition stopped after repeated restarts");
            self.emit(SpeechEvent::Stopped);
            return;
        }

        session.restart_count += 1;
        session.restart_pending = true;
        let epoch = session.epoch;
        let attempt = session.restart_count;
        drop(session);

        tracing::debug!(attempt, "restarting recognition");
        let weak = Arc::downgrade(self);
        let pause = self.restart_pause;
        tokio::spawn(async move {
            tokio::time::sleep(pause).await;
            restart(&weak, epoch);
        });
    }

    fn fire_restart(self: &Arc<Self>, epoch: u64) {
        let Some(recognizer) = self.recognizer.get() else {
            return;
        };
        let Ok(mut session) = self.session.lock() else {
            return;
        };
        if !session.restart_pending || session.epoch != epoch {
            return;
        }
        session.restart_pending = false;

        let settings = self.settings(&session);
        match recognizer.start(&settings, self.recognition.clone()) {
            Ok(()) => session.listening = true,
            Err(e) => {
                drop(session);
                tracing::warn!(error = %e, "recognition restart failed");
                self.on_ended();
            }
        }
    }

    fn settings(&self, session: &Session) -> RecognitionSettings {
        RecognitionSettings {
            language: session.language.clone(),
            continuous: session.continuous,
            interim_results: self.interim_results,
            max_alternatives: self.max_alternatives,
        }
    }

    fn with_session<T>(&self, read: impl FnOnce(&Session) -> T) -> T {
        let session = self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        read(&session)
    }

    fn emit(&self, event: SpeechEvent) {
        tracing::trace!(?event, "speech event");
        let _ = self.events.send(event);
    }
}

fn restart(handler: &Weak<SpeechHandler>, epoch: u64) {
    if let Some(handler) = handler.upgrade() {
        handler.fire_restart(epoch);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Result;

    /// Recognizer that replays a script of events on every start
    struct ScriptedRecognizer {
        script: Vec<RecognitionEvent>,
        starts: AtomicUsize,
        stops: AtomicUsize,
        sender: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
    }

    impl ScriptedRecognizer {
        fn new(script: Vec<RecognitionEvent>) -> Arc<Self> {
            Arc::new(Self {
                script,
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
                sender: Mutex::new(None),
            })
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn start(
            &self,
            _settings: &RecognitionSettings,
            events: mpsc::UnboundedSender<RecognitionEvent>,
        ) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            for event in &self.script {
                let _ = events.send(event.clone());
            }
            *self.sender.lock().unwrap() = Some(events);
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if let Some(events) = self.sender.lock().unwrap().take() {
                let _ = events.send(RecognitionEvent::Ended);
            }
        }
    }

    fn handler_with(
        recognizer: &Arc<ScriptedRecognizer>,
        continuous: bool,
    ) -> (Arc<SpeechHandler>, mpsc::UnboundedReceiver<SpeechEvent>) {
        let config = SpeechConfig {
            continuous,
            ..SpeechConfig::default()
        };
        SpeechHandler::new(
            &config,
            Capability::Available(Arc::clone(recognizer) as Arc<dyn Recognizer>),
        )
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SpeechEvent>) -> Vec<SpeechEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn unavailable_recognizer_refuses() {
        let (speech, _rx) = SpeechHandler::new(&SpeechConfig::default(), Capability::Unavailable);

        assert!(!speech.start_listening());
        assert!(!speech.set_language("fr-FR"));
        assert!(!speech.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_a_no_op() {
        let recognizer = ScriptedRecognizer::new(vec![RecognitionEvent::Started]);
        let (speech, mut rx) = handler_with(&recognizer, false);

        assert!(speech.start_listening());
        assert!(!speech.start_listening());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(drain(&mut rx), vec![SpeechEvent::Started]);
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_restarts_are_bounded() {
        let recognizer =
            ScriptedRecognizer::new(vec![RecognitionEvent::Started, RecognitionEvent::Ended]);
        let (speech, mut rx) = handler_with(&recognizer, true);

        assert!(speech.start_listening());
        tokio::time::sleep(Duration::from_secs(5)).await;

        // the first session plus three restarts
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 4);
        let events = drain(&mut rx);
        let stopped = events.iter().filter(|e| **e == SpeechEvent::Stopped).count();
        assert_eq!(stopped, 1);
        assert_eq!(events.last(), Some(&SpeechEvent::Stopped));
        assert!(!speech.is_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_pending_restart_cancels_it() {
        let recognizer =
            ScriptedRecognizer::new(vec![RecognitionEvent::Started, RecognitionEvent::Ended]);
        let (speech, mut rx) = handler_with(&recognizer, true);

        assert!(speech.start_listening());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(speech.stop_listening());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut rx),
            vec![SpeechEvent::Started, SpeechEvent::Stopped]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_raises_stopped_once() {
        let recognizer = ScriptedRecognizer::new(vec![RecognitionEvent::Started]);
        let (speech, mut rx) = handler_with(&recognizer, true);

        assert!(speech.start_listening());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(speech.stop_listening());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(recognizer.stops.load(Ordering::SeqCst), 1);
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut rx),
            vec![SpeechEvent::Started, SpeechEvent::Stopped]
        );
        assert!(!speech.stop_listening());
    }

    #[tokio::test(start_paused = true)]
    async fn results_and_errors_are_translated() {
        let recognizer = ScriptedRecognizer::new(vec![
            RecognitionEvent::Started,
            RecognitionEvent::Result {
                transcript: "hel".to_string(),
                is_final: false,
            },
            RecognitionEvent::Result {
                transcript: "hello".to_string(),
                is_final: true,
            },
            RecognitionEvent::Error(RecognitionErrorCode::NoSpeech),
            RecognitionEvent::Error(RecognitionErrorCode::Network),
            RecognitionEvent::Error(RecognitionErrorCode::NotAllowed),
            RecognitionEvent::Ended,
        ]);
        let (speech, mut rx) = handler_with(&recognizer, true);

        assert!(speech.start_listening());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                SpeechEvent::Started,
                SpeechEvent::InterimResult("hel".to_string()),
                SpeechEvent::Result("hello".to_string()),
                SpeechEvent::Error(SpeechError::Network),
                SpeechEvent::Error(SpeechError::PermissionDenied),
                SpeechEvent::Stopped,
            ]
        );
        // permission denial disarms restart
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn microphone_failure_is_reported_once_without_restart() {
        let recognizer = ScriptedRecognizer::new(vec![
            RecognitionEvent::Error(RecognitionErrorCode::NotAllowed),
            RecognitionEvent::Ended,
        ]);
        let (speech, mut rx) = handler_with(&recognizer, true);

        assert!(speech.start_listening());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            drain(&mut rx),
            vec![
                SpeechEvent::Error(SpeechError::PermissionDenied),
                SpeechEvent::Stopped,
            ]
        );
        assert_eq!(recognizer.starts.load(Ordering::SeqCst), 1);
        assert!(!speech.is_listening());
    }

    #[tokio::test]
    async fn toggle_and_settings() {
        let recognizer = ScriptedRecognizer::new(vec![]);
        let (speech, _rx) = handler_with(&recognizer, false);

        assert!(speech.toggle_listening());
        assert!(speech.is_listening());
        assert!(!speech.toggle_listening());

        assert!(speech.set_language("ja-JP"));
        assert!(!speech.set_language("  "));
        assert_eq!(speech.language(), "ja-JP");
        speech.set_continuous(true);
        assert!(speech.continuous());
        assert_eq!(SpeechHandler::supported_languages().len(), 11);
    }
}
