//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use headroom::voice::{AudioOutput, EncodedAudio, MediaResource, ReadyState};
use serde_json::{Value, json};
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port, returning its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    format!("http://{addr}")
}

/// Request bodies a fake server received
#[derive(Clone, Default)]
pub struct Received {
    bodies: Arc<Mutex<Vec<Value>>>,
}

impl Received {
    pub fn bodies(&self) -> Vec<Value> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    fn push(&self, body: Value) {
        self.bodies.lock().unwrap().push(body);
    }
}

/// How the fake chat server answers
#[derive(Clone)]
pub enum ChatReply {
    Content(String),
    Status(StatusCode),
}

#[derive(Clone)]
struct ChatState {
    reply: ChatReply,
    received: Received,
}

async fn chat_handler(State(state): State<ChatState>, Json(body): Json<Value>) -> Response {
    state.received.push(body);
    match state.reply {
        ChatReply::Content(content) => Json(json!({
            "model": "test-model",
            "message": { "role": "assistant", "content": content },
            "done": true,
        }))
        .into_response(),
        ChatReply::Status(status) => (status, "internal error").into_response(),
    }
}

/// Fake Ollama server; returns the `/api/chat` URL
pub async fn spawn_chat_server(reply: ChatReply) -> (String, Received) {
    let received = Received::default();
    let state = ChatState {
        reply,
        received: received.clone(),
    };
    let router = Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(state);

    let base = spawn_server(router).await;
    (format!("{base}/api/chat"), received)
}

/// Behaviour of the fake TTS server
#[derive(Clone, Default)]
pub struct TtsServerOptions {
    pub unhealthy: bool,
    /// Reply to `/tts` with JSON instead of audio
    pub wrong_content_type: bool,
    /// List no voices or models
    pub empty_catalogue: bool,
}

#[derive(Clone)]
struct TtsState {
    options: TtsServerOptions,
    received: Received,
}

async fn tts_health(State(state): State<TtsState>) -> StatusCode {
    if state.options.unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// Synthesis takes as many milliseconds as the number after `:` in the text
async fn tts_synthesize(State(state): State<TtsState>, Json(body): Json<Value>) -> Response {
    let delay = body["text"]
        .as_str()
        .and_then(|t| t.split(':').nth(1))
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);
    state.received.push(body);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    if state.options.wrong_content_type {
        return Json(json!({ "error": "not audio" })).into_response();
    }
    ([(header::CONTENT_TYPE, "audio/wav")], wav_bytes()).into_response()
}

async fn tts_voices(State(state): State<TtsState>) -> Json<Value> {
    if state.options.empty_catalogue {
        return Json(json!({}));
    }
    Json(json!({
        "voices": [
            { "id": "emma", "name": "Emma", "language": "en_US", "gender": "female" },
            { "id": "liam", "name": "Liam" },
        ]
    }))
}

async fn tts_models(State(state): State<TtsState>) -> Json<Value> {
    if state.options.empty_catalogue {
        return Json(json!({ "models": [] }));
    }
    Json(json!({ "models": [ { "id": "fast", "name": "Fast" }, { "name": "slow" } ] }))
}

/// Fake TTS server; returns its base URL
pub async fn spawn_tts_server(options: TtsServerOptions) -> (String, Received) {
    let received = Received::default();
    let state = TtsState {
        options,
        received: received.clone(),
    };
    let router = Router::new()
        .route("/health", get(tts_health))
        .route("/tts", post(tts_synthesize))
        .route("/voices", get(tts_voices))
        .route("/models", get(tts_models))
        .with_state(state);

    (spawn_server(router).await, received)
}

/// A tenth of a second of 16kHz silence as WAV
pub fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..1600 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Resource that is ready at once and ends as soon as it plays
struct InstantTrack {
    ended: AtomicBool,
}

impl MediaResource for InstantTrack {
    fn ready_state(&self) -> headroom::Result<ReadyState> {
        Ok(ReadyState::HaveEnoughData)
    }

    fn play(&mut self) -> headroom::Result<()> {
        self.ended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

/// Audio output that records what it was asked to load
#[derive(Default)]
pub struct RecordingOutput {
    loaded: Mutex<Vec<EncodedAudio>>,
}

impl RecordingOutput {
    pub fn loaded(&self) -> Vec<EncodedAudio> {
        self.loaded.lock().unwrap().clone()
    }
}

impl AudioOutput for RecordingOutput {
    fn load(&self, audio: EncodedAudio) -> headroom::Result<Box<dyn MediaResource>> {
        self.loaded.lock().unwrap().push(audio);
        Ok(Box::new(InstantTrack {
            ended: AtomicBool::new(false),
        }))
    }
}
