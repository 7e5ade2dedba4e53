//! Chat controller integration tests against a fake Ollama server

use std::sync::Arc;

use axum::http::StatusCode;
use headroom::chat::{MemoryTranscript, Outcome, Speaker, TranscriptEntry};
use headroom::config::{ChatConfig, TtsConfig};
use headroom::voice::{RemoteTts, TtsBackend};
use headroom::{
    Capability, ChatBackend, ChatController, Message, OllamaClient, Role, TtsHandler,
};

mod common;
use common::{ChatReply, spawn_chat_server};

const MODEL: &str = "llama3:8b";

fn chat_config(url: &str) -> ChatConfig {
    ChatConfig {
        url: url.to_string(),
        model: MODEL.to_string(),
        ..ChatConfig::default()
    }
}

/// TTS with nothing behind it, pointed at a port nobody listens on
fn unreachable_tts(enabled: bool) -> Arc<TtsHandler> {
    let config = TtsConfig {
        enabled,
        url: "http://127.0.0.1:9".to_string(),
        ..TtsConfig::default()
    };
    let remote: Arc<dyn TtsBackend> = Arc::new(RemoteTts::new(&config.url));
    Arc::new(TtsHandler::new(
        &config,
        Some(remote),
        Capability::Unavailable,
        Capability::Unavailable,
    ))
}

fn build(url: &str, tts: Arc<TtsHandler>) -> (ChatController, MemoryTranscript) {
    let config = chat_config(url);
    let backend: Arc<dyn ChatBackend> = Arc::new(OllamaClient::new(&config.url, &config.model));
    let transcript = MemoryTranscript::new();
    let chat = ChatController::new(&config, backend, Box::new(transcript.clone()), tts);
    (chat, transcript)
}

#[tokio::test]
async fn hello_round_trip() {
    let (url, received) = spawn_chat_server(ChatReply::Content("Hi there".to_string())).await;
    let (mut chat, transcript) = build(&url, unreachable_tts(false));

    let reply = chat.send_message("Hello").await.unwrap();
    assert_eq!(reply.outcome, Outcome::Replied);
    assert_eq!(reply.content, "Hi there");

    let welcome = ChatConfig::default().welcome_message;
    let history = chat.history().messages();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[1], Message::assistant(welcome.clone()));
    assert_eq!(history[2], Message::user("Hello"));
    assert_eq!(history[3], Message::assistant("Hi there"));

    assert_eq!(
        transcript.entries(),
        vec![
            TranscriptEntry {
                speaker: Speaker::Assistant,
                text: welcome,
            },
            TranscriptEntry {
                speaker: Speaker::User,
                text: "Hello".to_string(),
            },
            TranscriptEntry {
                speaker: Speaker::Assistant,
                text: "Hi there".to_string(),
            },
        ]
    );

    let bodies = received.bodies();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], MODEL);
    assert_eq!(bodies[0]["stream"], false);
    assert_eq!(bodies[0]["messages"].as_array().unwrap().len(), 3);
    assert_eq!(bodies[0]["messages"][2]["content"], "Hello");
}

#[tokio::test]
async fn server_error_renders_apology() {
    let (url, received) =
        spawn_chat_server(ChatReply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let (mut chat, transcript) = build(&url, unreachable_tts(false));

    let reply = chat.send_message("Hello").await.unwrap();

    let apology = format!(
        "Sorry, I encountered an error connecting to the chat server. Please make sure Ollama is running locally with the {MODEL} model."
    );
    assert_eq!(reply.outcome, Outcome::Failed);
    assert_eq!(reply.content, apology);
    assert_eq!(chat.history().last(), Some(&Message::assistant(apology.clone())));
    assert_eq!(transcript.texts().last(), Some(&apology));
    assert_eq!(received.count(), 1);
}

#[tokio::test]
async fn unreachable_server_renders_apology() {
    let (mut chat, _transcript) = build("http://127.0.0.1:9/api/chat", unreachable_tts(false));

    let reply = chat.send_message("anyone there?").await.unwrap();
    assert_eq!(reply.outcome, Outcome::Failed);
    assert!(reply.content.contains(MODEL));
}

#[tokio::test]
async fn blank_input_sends_nothing() {
    let (url, received) = spawn_chat_server(ChatReply::Content("unused".to_string())).await;
    let (mut chat, transcript) = build(&url, unreachable_tts(false));

    assert!(chat.send_message("").await.is_none());
    assert!(chat.send_message("   ").await.is_none());

    assert_eq!(received.count(), 0);
    assert_eq!(chat.history().len(), 2);
    assert_eq!(transcript.entries().len(), 1);
}

#[tokio::test]
async fn reset_keeps_enabled_state_when_welcome_fails() {
    let (url, _received) = spawn_chat_server(ChatReply::Content("ok".to_string())).await;

    for enabled in [false, true] {
        let tts = unreachable_tts(enabled);
        let (mut chat, transcript) = build(&url, Arc::clone(&tts));
        chat.send_message("Hello").await;

        let spoke = chat.reset_conversation().await.unwrap();

        assert!(!spoke);
        assert_eq!(tts.enabled(), enabled);
        assert_eq!(chat.history().len(), 2);
        assert_eq!(transcript.texts(), vec![ChatConfig::default().welcome_message]);
    }
}

#[test]
fn history_serializes_for_the_wire() {
    let json = serde_json::to_value([Message::system("s"), Message::user("u")]).unwrap();
    assert_eq!(json[0]["role"], "system");
    assert_eq!(json[1], serde_json::json!({ "role": "user", "content": "u" }));
}
