//! TOML configuration file loading
//!
//! Supports `~/.config/headroom/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HeadroomConfigFile {
    /// Chat endpoint configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Text-to-speech configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Speech recognition configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Static server configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Chat endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Chat endpoint URL
    pub url: Option<String>,

    /// Model identifier
    pub model: Option<String>,

    /// System prompt
    pub system_prompt: Option<String>,

    /// Assistant greeting
    pub welcome_message: Option<String>,
}

/// Text-to-speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub enabled: Option<bool>,
    pub remote_enabled: Option<bool>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub speaker: Option<String>,
    pub voice: Option<String>,
    pub use_builtin_fallback: Option<bool>,
    pub readiness_interval_ms: Option<u64>,
    pub readiness_attempts: Option<u32>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub url: Option<String>,
    pub enabled: Option<bool>,
    pub use_builtin_fallback: Option<bool>,
    pub language: Option<String>,
    pub continuous: Option<bool>,
    pub interim_results: Option<bool>,
    pub max_alternatives: Option<u32>,
    pub max_restarts: Option<u32>,
    pub restart_pause_ms: Option<u64>,
}

/// Static server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Asset root directory
    pub root: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HeadroomConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HeadroomConfigFile {
    config_file_path().map_or_else(HeadroomConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
pub fn load_from(path: &Path) -> HeadroomConfigFile {
    if !path.exists() {
        return HeadroomConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HeadroomConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HeadroomConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/headroom/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("headroom").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let fc = load_from(&dir.path().join("absent.toml"));
        assert!(fc.chat.model.is_none());
    }

    #[test]
    fn broken_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[chat\nmodel = ").unwrap();

        let fc = load_from(&path);
        assert!(fc.chat.model.is_none());
    }

    #[test]
    fn partial_file_overlays() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[speech]\nlanguage = \"fr-FR\"\nmax_restarts = 5\n\n[server]\nport = 8080\n",
        )
        .unwrap();

        let fc = load_from(&path);
        assert_eq!(fc.speech.language.as_deref(), Some("fr-FR"));
        assert_eq!(fc.speech.max_restarts, Some(5));
        assert_eq!(fc.server.port, Some(8080));
        assert!(fc.tts.url.is_none());
    }
}
