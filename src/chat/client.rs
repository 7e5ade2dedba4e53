//! Ollama chat API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Message;
use crate::{Error, Result};

/// Something that answers a conversation
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the whole history and return the assistant's reply
    ///
    /// # Errors
    ///
    /// Returns error on network failure, non-2xx status, or a malformed body
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Model the backend talks to
    fn model(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

/// Client for `POST /api/chat` with streaming off
pub struct OllamaClient {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaClient {
    #[must_use]
    pub fn new(url: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        tracing::debug!(model = %self.model, messages = messages.len(), "sending chat request");

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "chat server error");
            return Err(Error::Chat(format!("chat server returned {status}")));
        }

        let body = response.text().await?;
        let reply: ChatResponse = serde_json::from_str(&body)?;

        tracing::debug!(chars = reply.message.content.len(), "chat reply received");
        Ok(reply.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_disables_streaming() {
        let messages = [Message::system("sys"), Message::user("hi")];
        let json = serde_json::to_value(ChatRequest {
            model: "llama3",
            messages: &messages,
            stream: false,
        })
        .unwrap();

        assert_eq!(json["model"], "llama3");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn reply_parses_nested_content() {
        let reply: ChatResponse =
            serde_json::from_str(r#"{"model":"x","message":{"role":"assistant","content":"Hi there"},"done":true}"#)
                .unwrap();
        assert_eq!(reply.message.content, "Hi there");
    }
}
