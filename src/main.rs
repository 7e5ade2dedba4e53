use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use headroom::chat::TerminalTranscript;
use headroom::voice::{AudioCapture, RemoteTts, SpeechHandler, TtsBackend, TtsHandler, rms};
use headroom::{Capabilities, ChatBackend, ChatController, Config, OllamaClient, StaticServer};

mod repl;

/// Headroom - voice-capable chat client for a local LLM server
#[derive(Parser)]
#[command(name = "headroom", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal (default)
    Chat {
        /// Chat model to use
        #[arg(short, long, env = "HEADROOM_MODEL")]
        model: Option<String>,

        /// Speak replies from the start
        #[arg(long)]
        audio: bool,
    },
    /// Serve the page assets
    Serve {
        /// Port to listen on
        #[arg(short, long, env = "HEADROOM_PORT")]
        port: Option<u16>,

        /// Asset root directory
        #[arg(short, long, env = "HEADROOM_ROOT")]
        root: Option<PathBuf>,
    },
    /// Speak a sample through the configured TTS backends
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// List the TTS server's voices and models
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,headroom=info",
        1 => "info,headroom=debug",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries the transcript
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();

    match cli.command.unwrap_or(Command::Chat {
        model: None,
        audio: false,
    }) {
        Command::Chat { model, audio } => {
            if let Some(model) = model {
                config.chat.model = model;
            }
            config.tts.enabled |= audio;
            chat(&config).await
        }
        Command::Serve { port, root } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(root) = root {
                config.server.root = root;
            }
            StaticServer::new(&config.server).run().await?;
            Ok(())
        }
        Command::TestTts { text } => test_tts(&config, &text).await,
        Command::Voices => list_voices(&config).await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

/// Build the TTS handler over the detected capabilities
fn build_tts(config: &Config, caps: &Capabilities) -> (Arc<TtsHandler>, Arc<RemoteTts>) {
    let remote = Arc::new(RemoteTts::new(&config.tts.url));
    let tts = Arc::new(TtsHandler::new(
        &config.tts,
        Some(Arc::clone(&remote) as Arc<dyn TtsBackend>),
        caps.audio_output.clone(),
        caps.synthesis.clone(),
    ));
    (tts, remote)
}

async fn chat(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        url = %config.chat.url,
        model = %config.chat.model,
        tts = config.tts.enabled,
        "starting headroom"
    );

    let caps = Capabilities::detect(config);
    let (tts, remote) = build_tts(config, &caps);
    let backend: Arc<dyn ChatBackend> =
        Arc::new(OllamaClient::new(&config.chat.url, &config.chat.model));

    let chat = ChatController::new(
        &config.chat,
        backend,
        Box::new(TerminalTranscript::new("headroom")),
        tts,
    );

    let (chat, speech_events) = if caps.recognition.is_available() {
        let (speech, events) = SpeechHandler::new(&config.speech, caps.recognition.clone());
        (chat.with_speech(speech), Some(events))
    } else {
        (chat, None)
    };

    repl::Repl::new(chat, Some(remote), speech_events).run().await
}

/// Speak a sample with TTS forced on
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let mut config = config.clone();
    config.tts.enabled = true;

    let caps = Capabilities::detect(&config);
    let (tts, _remote) = build_tts(&config, &caps);

    println!("Speaking with {}...", tts.backend_label());
    if tts.speak(text).await {
        println!("\n---");
        println!("If you heard the speech, TTS is working!");
        Ok(())
    } else {
        anyhow::bail!("no TTS backend produced speech (is the TTS server running at {}?)", config.tts.url)
    }
}

async fn list_voices(config: &Config) -> anyhow::Result<()> {
    let remote = RemoteTts::new(&config.tts.url);

    remote
        .health()
        .await
        .map_err(|e| anyhow::anyhow!("TTS server at {} is not available: {e}", remote.base_url()))?;

    println!("Voices:");
    for voice in remote.voices().await? {
        let language = voice.language.as_deref().unwrap_or("-");
        println!("  {:<12} {:<24} {language}", voice.id, voice.name);
    }

    println!("\nModels:");
    for model in remote.models().await? {
        println!("  {:<12} {}", model.key(), model.label());
    }

    Ok(())
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // cpal streams stay on the thread that opened them
    let report = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;
        println!("Sample rate: {} Hz", capture.sample_rate());
        println!("---");

        for i in 0..duration {
            std::thread::sleep(Duration::from_secs(1));

            let samples = capture.take_buffer();
            let energy = rms(&samples);
            let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
        }

        capture.stop();
        Ok(())
    });
    report.await??;

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    Ok(())
}
