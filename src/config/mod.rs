//! Configuration management for Headroom
//!
//! One explicit [`Config`] is built at startup and passed by reference to
//! each component constructor. Sources are layered env > TOML file > defaults.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use file::HeadroomConfigFile;

/// Default Ollama chat endpoint
pub const DEFAULT_CHAT_URL: &str = "http://localhost:11434/api/chat";

/// Default chat model
pub const DEFAULT_MODEL: &str = "huihui_ai/qwen2.5-abliterate:32b";

/// Default system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and friendly AI assistant called Headroom. Keep your responses concise and informative.";

/// Greeting shown (and spoken) when a conversation starts
pub const DEFAULT_WELCOME: &str = "Hello! I'm Headroom. How can I assist you today?";

/// Default remote TTS server
pub const DEFAULT_TTS_URL: &str = "http://localhost:8008";

/// Default STT endpoint
pub const DEFAULT_STT_URL: &str = "http://localhost:5001/api/stt";

/// Default static server port
pub const DEFAULT_PORT: u16 = 3023;

/// Headroom configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Chat endpoint configuration
    pub chat: ChatConfig,

    /// Text-to-speech configuration
    pub tts: TtsConfig,

    /// Speech recognition configuration
    pub speech: SpeechConfig,

    /// Static asset server configuration
    pub server: ServerConfig,
}

/// Chat endpoint configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Full URL of the chat endpoint (e.g. `http://localhost:11434/api/chat`)
    pub url: String,

    /// Model name sent with every request
    pub model: String,

    /// System prompt placed first in the history
    pub system_prompt: String,

    /// Assistant greeting placed second in the history
    pub welcome_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHAT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            welcome_message: DEFAULT_WELCOME.to_string(),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Speak assistant replies
    pub enabled: bool,

    /// Try the remote TTS server before the native fallback
    pub remote_enabled: bool,

    /// Remote TTS server base URL (`/health` and `/tts` are appended)
    pub url: String,

    /// Remote model identifier
    pub model: String,

    /// Remote speaker identifier
    pub speaker: String,

    /// Remote voice/language identifier (e.g. "`en_US`")
    pub voice: String,

    /// Fall back to native speech synthesis
    pub use_builtin_fallback: bool,

    /// Interval between audio readiness checks
    pub readiness_interval: Duration,

    /// Maximum readiness checks before giving up
    pub readiness_attempts: u32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_enabled: true,
            url: DEFAULT_TTS_URL.to_string(),
            model: "default".to_string(),
            speaker: "default".to_string(),
            voice: "en_US".to_string(),
            use_builtin_fallback: true,
            readiness_interval: Duration::from_millis(100),
            readiness_attempts: 50,
        }
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// STT endpoint used by the microphone recognizer
    pub url: String,

    /// Voice input enabled at startup
    pub enabled: bool,

    /// Use the host recognizer when no dedicated STT server is configured
    pub use_builtin_fallback: bool,

    /// Recognition locale (BCP 47)
    pub language: String,

    /// Keep capturing across utterances, auto-restarting on drop
    pub continuous: bool,

    /// Emit interim results
    pub interim_results: bool,

    /// Alternatives requested per result
    pub max_alternatives: u32,

    /// Consecutive auto-restarts allowed before giving up
    pub max_restarts: u32,

    /// Pause before an auto-restart
    pub restart_pause: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STT_URL.to_string(),
            enabled: false,
            use_builtin_fallback: true,
            language: "en-US".to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
            max_restarts: 3,
            restart_pause: Duration::from_millis(500),
        }
    }
}

/// Static asset server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Asset root directory
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from the environment and the TOML config file
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Environment values win over file values, which win over defaults.
    pub fn from_sources<F>(fc: HeadroomConfigFile, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            url: env("HEADROOM_CHAT_URL")
                .or(fc.chat.url)
                .unwrap_or(chat_defaults.url),
            model: env("HEADROOM_MODEL")
                .or(fc.chat.model)
                .unwrap_or(chat_defaults.model),
            system_prompt: env("HEADROOM_SYSTEM_PROMPT")
                .or(fc.chat.system_prompt)
                .unwrap_or(chat_defaults.system_prompt),
            welcome_message: fc
                .chat
                .welcome_message
                .unwrap_or(chat_defaults.welcome_message),
        };

        let tts_defaults = TtsConfig::default();
        let tts = TtsConfig {
            enabled: env("HEADROOM_TTS_ENABLED")
                .as_deref()
                .and_then(parse_bool)
                .or(fc.tts.enabled)
                .unwrap_or(tts_defaults.enabled),
            remote_enabled: fc.tts.remote_enabled.unwrap_or(tts_defaults.remote_enabled),
            url: env("HEADROOM_TTS_URL")
                .or(fc.tts.url)
                .unwrap_or(tts_defaults.url),
            model: env("HEADROOM_TTS_MODEL")
                .or(fc.tts.model)
                .unwrap_or(tts_defaults.model),
            speaker: env("HEADROOM_TTS_SPEAKER")
                .or(fc.tts.speaker)
                .unwrap_or(tts_defaults.speaker),
            voice: env("HEADROOM_TTS_VOICE")
                .or(fc.tts.voice)
                .unwrap_or(tts_defaults.voice),
            use_builtin_fallback: fc
                .tts
                .use_builtin_fallback
                .unwrap_or(tts_defaults.use_builtin_fallback),
            readiness_interval: fc
                .tts
                .readiness_interval_ms
                .map_or(tts_defaults.readiness_interval, Duration::from_millis),
            readiness_attempts: fc
                .tts
                .readiness_attempts
                .unwrap_or(tts_defaults.readiness_attempts),
        };

        let speech_defaults = SpeechConfig::default();
        let speech = SpeechConfig {
            url: env("HEADROOM_STT_URL")
                .or(fc.speech.url)
                .unwrap_or(speech_defaults.url),
            enabled: env("HEADROOM_STT_ENABLED")
                .as_deref()
                .and_then(parse_bool)
                .or(fc.speech.enabled)
                .unwrap_or(speech_defaults.enabled),
            use_builtin_fallback: fc
                .speech
                .use_builtin_fallback
                .unwrap_or(speech_defaults.use_builtin_fallback),
            language: env("HEADROOM_LANGUAGE")
                .or(fc.speech.language)
                .unwrap_or(speech_defaults.language),
            continuous: fc.speech.continuous.unwrap_or(speech_defaults.continuous),
            interim_results: fc
                .speech
                .interim_results
                .unwrap_or(speech_defaults.interim_results),
            max_alternatives: fc
                .speech
                .max_alternatives
                .unwrap_or(speech_defaults.max_alternatives),
            max_restarts: fc.speech.max_restarts.unwrap_or(speech_defaults.max_restarts),
            restart_pause: fc
                .speech
                .restart_pause_ms
                .map_or(speech_defaults.restart_pause, Duration::from_millis),
        };

        let server = ServerConfig {
            port: env("HEADROOM_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            root: env("HEADROOM_ROOT")
                .or(fc.server.root)
                .map_or_else(|| PathBuf::from("."), PathBuf::from),
        };

        Self {
            chat,
            tts,
            speech,
            server,
        }
    }
}

/// Parse a boolean-ish environment value
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
