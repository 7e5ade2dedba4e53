//! Remote TTS server client
//!
//! Speaks the local TTS server protocol: `GET /health`, `POST /tts`
//! (JSON in, audio bytes out), and the `GET /voices` / `GET /models`
//! catalogues used by the settings surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::media::EncodedAudio;
use crate::{Error, Result};

/// Body of a `POST /tts` request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub model: String,
    pub speaker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub speed: f32,
}

/// A voice offered by the TTS server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteVoice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// A model offered by the TTS server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteModel {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl RemoteModel {
    /// Identifier to send back in requests
    #[must_use]
    pub fn key(&self) -> &str {
        self.id.as_deref().or(self.name.as_deref()).unwrap_or("default")
    }

    /// Human-readable label
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.as_deref().or(self.id.as_deref()).unwrap_or("Default")
    }
}

#[derive(Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Option<Vec<RemoteVoice>>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Option<Vec<RemoteModel>>,
}

/// Voices offered when the server doesn't list any
#[must_use]
pub fn default_voices() -> Vec<RemoteVoice> {
    [
        ("female_1", "Female Voice 1"),
        ("male_1", "Male Voice 1"),
        ("female_2", "Female Voice 2"),
        ("male_2", "Male Voice 2"),
    ]
    .into_iter()
    .map(|(id, name)| RemoteVoice {
        id: id.to_string(),
        name: name.to_string(),
        language: None,
        gender: None,
    })
    .collect()
}

/// Remote synthesis backend
#[async_trait]
pub trait TtsBackend: Send + Sync {
    /// Probe availability
    ///
    /// # Errors
    ///
    /// Returns error if the backend is unreachable or unhealthy
    async fn health(&self) -> Result<()>;

    /// Synthesize `request.text` to encoded audio
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the reply isn't audio
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<EncodedAudio>;

    /// Human-readable backend name
    fn name(&self) -> &str;
}

/// HTTP client for the local TTS server
pub struct RemoteTts {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTts {
    /// Create a client for the server at `base_url`
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List voices, substituting the defaults when the server lists none
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body is malformed
    pub async fn voices(&self) -> Result<Vec<RemoteVoice>> {
        let body: VoicesResponse = self
            .client
            .get(format!("{}/voices", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body
            .voices
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_voices))
    }

    /// List models, substituting `default` when the server lists none
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body is malformed
    pub async fn models(&self) -> Result<Vec<RemoteModel>> {
        let body: ModelsResponse = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let models = body.models.unwrap_or_default();
        if models.is_empty() {
            return Ok(vec![RemoteModel {
                id: Some("default".to_string()),
                name: Some("Default".to_string()),
            }]);
        }
        Ok(models)
    }
}

#[async_trait]
impl TtsBackend for RemoteTts {
    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Tts(format!(
                "health check failed with status {}",
                response.status()
            )))
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<EncodedAudio> {
        tracing::debug!(
            chars = request.text.len(),
            model = %request.model,
            speaker = %request.speaker,
            "requesting remote synthesis"
        );

        let response = self
            .client
            .post(format!("{}/tts", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS server error {status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        if let Some(ct) = content_type.as_deref() {
            if !ct.starts_with("audio/") {
                return Err(Error::Tts(format!("expected audio, got {ct}")));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::Tts("empty audio body".to_string()));
        }

        Ok(EncodedAudio::new(bytes.to_vec(), content_type))
    }

    fn name(&self) -> &str {
        "local TTS server"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_empty_voice() {
        let request = SynthesisRequest {
            text: "hi".to_string(),
            model: "default".to_string(),
            speaker: "emma".to_string(),
            voice: None,
            speed: 1.0,
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["text"], "hi");
        assert_eq!(json["speaker"], "emma");
        assert!(json.get("voice").is_none());
    }

    #[test]
    fn model_key_falls_back_to_name() {
        let model = RemoteModel {
            id: None,
            name: Some("Clear Speech".to_string()),
        };
        assert_eq!(model.key(), "Clear Speech");
        assert_eq!(model.label(), "Clear Speech");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        assert_eq!(RemoteTts::new("http://localhost:8008/").base_url(), "http://localhost:8008");
    }
}
