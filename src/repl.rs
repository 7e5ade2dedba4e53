//! Interactive terminal front-end

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use headroom::ChatController;
use headroom::voice::{RemoteTts, SpeechEvent, SpeechHandler, VoiceSelector};

const HELP: &str = "\
commands:
  /reset                  start a new conversation
  /audio                  toggle spoken replies
  /voice                  toggle speech input
  /lang <code>            set the recognition language
  /continuous             toggle continuous speech input
  /stop                   stop speaking
  /test-voice             speak a sample
  /voices                 list TTS voices
  /models                 list TTS models
  /model <id>             set the TTS model
  /speaker <id>           set the TTS speaker
  /remote-voice <id>      set the TTS server voice
  /native-voice <n|name>  pick a built-in voice
  /rate <r>               set the speech rate (0.1 to 10)
  /quit                   exit";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Message(String),
    Reset,
    Audio,
    Voice,
    Lang(String),
    Continuous,
    Stop,
    TestVoice,
    Voices,
    Models,
    Model(String),
    Speaker(String),
    RemoteVoice(String),
    NativeVoice(String),
    Rate(String),
    Help,
    Quit,
    Unknown(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let Some(command) = line.strip_prefix('/') else {
            return Self::Message(line.to_string());
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(n, a)| (n, a.trim()));
        let arg = arg.to_string();

        match name {
            "reset" => Self::Reset,
            "audio" => Self::Audio,
            "voice" => Self::Voice,
            "lang" => Self::Lang(arg),
            "continuous" => Self::Continuous,
            "stop" => Self::Stop,
            "test-voice" => Self::TestVoice,
            "voices" => Self::Voices,
            "models" => Self::Models,
            "model" => Self::Model(arg),
            "speaker" => Self::Speaker(arg),
            "remote-voice" => Self::RemoteVoice(arg),
            "native-voice" => Self::NativeVoice(arg),
            "rate" => Self::Rate(arg),
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// Speech rate that goes with a TTS model
pub fn rate_for_model(model: &str) -> f32 {
    match model {
        "slow" => 0.7,
        "fast" => 1.5,
        _ => 1.0,
    }
}

/// A voice index when `choice` is a number, otherwise a name
pub fn voice_selector(choice: &str) -> VoiceSelector {
    choice.parse().map_or_else(
        |_| VoiceSelector::Name(choice.to_string()),
        VoiceSelector::Index,
    )
}

/// The REPL loop
pub struct Repl {
    chat: ChatController,
    remote: Option<Arc<RemoteTts>>,
    speech_events: Option<mpsc::UnboundedReceiver<SpeechEvent>>,
}

impl Repl {
    pub fn new(
        chat: ChatController,
        remote: Option<Arc<RemoteTts>>,
        speech_events: Option<mpsc::UnboundedReceiver<SpeechEvent>>,
    ) -> Self {
        Self {
            chat,
            remote,
            speech_events,
        }
    }

    /// Read lines until `/quit` or end of input
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut speech_events = self.speech_events.take();

        println!("(type /help for commands)");
        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    if !self.handle(Input::parse(&line)).await {
                        break;
                    }
                }
                Some(event) = next_event(&mut speech_events) => {
                    self.chat.handle_speech_event(event).await;
                }
            }
        }

        self.chat.tts().stop_speaking();
        if let Some(speech) = self.chat.speech() {
            speech.stop_listening();
        }
        Ok(())
    }

    /// Handle one input; false to quit
    async fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Message(text) => {
                self.chat.send_message(&text).await;
            }
            Input::Reset => {
                self.chat.reset_conversation();
            }
            Input::Audio => {
                self.chat.toggle_audio();
            }
            Input::Voice => {
                let listening = self.chat.toggle_listening();
                println!("-- speech input {}", if listening { "on" } else { "off" });
            }
            Input::Lang(code) => self.set_language(&code),
            Input::Continuous => self.toggle_continuous(),
            Input::Stop => self.chat.tts().stop_speaking(),
            Input::TestVoice => {
                self.chat.test_voice();
            }
            Input::Voices => self.list_voices().await,
            Input::Models => self.list_models().await,
            Input::Model(model) => {
                let tts = self.chat.tts();
                if tts.set_model(&model) {
                    tts.set_rate(rate_for_model(&model));
                    println!("-- TTS model {model}");
                } else {
                    println!("-- usage: /model <id>");
                }
            }
            Input::Speaker(speaker) => {
                if self.chat.tts().set_speaker(&speaker) {
                    println!("-- TTS speaker {speaker}");
                } else {
                    println!("-- usage: /speaker <id>");
                }
            }
            Input::RemoteVoice(voice) => {
                if self.chat.tts().set_remote_voice(&voice) {
                    println!("-- TTS server voice {voice}");
                } else {
                    println!("-- usage: /remote-voice <id>");
                }
            }
            Input::NativeVoice(choice) => {
                if choice.is_empty() || !self.chat.tts().set_voice(&voice_selector(&choice)) {
                    println!("-- no built-in voice matches '{choice}' (see /voices)");
                } else if let Some(voice) = self.chat.tts().settings().voice {
                    println!("-- built-in voice {}", voice.name);
                }
            }
            Input::Rate(rate) => match rate.parse::<f32>() {
                Ok(r) if self.chat.tts().set_rate(r) => println!("-- speech rate {r}"),
                _ => println!("-- rate must be a number from 0.1 to 10"),
            },
            Input::Help => println!("{HELP}"),
            Input::Quit => return false,
            Input::Unknown(name) => println!("-- unknown command /{name} (try /help)"),
        }
        true
    }

    fn set_language(&self, code: &str) {
        let Some(speech) = self.chat.speech() else {
            println!("-- speech recognition is not available");
            return;
        };
        if speech.set_language(code) {
            println!("-- recognition language {code}");
        } else {
            println!("-- supported languages:");
            for (code, name) in SpeechHandler::supported_languages() {
                println!("   {code:<6} {name}");
            }
        }
    }

    fn toggle_continuous(&self) {
        let Some(speech) = self.chat.speech() else {
            println!("-- speech recognition is not available");
            return;
        };
        let continuous = !speech.continuous();
        speech.set_continuous(continuous);
        println!(
            "-- continuous speech input {}",
            if continuous { "on" } else { "off" }
        );
    }

    async fn list_voices(&self) {
        if let Some(remote) = &self.remote {
            match remote.voices().await {
                Ok(voices) => {
                    println!("-- TTS server voices:");
                    for voice in voices {
                        println!("   {:<12} {}", voice.id, voice.name);
                    }
                }
                Err(e) => println!("-- could not list TTS server voices: {e}"),
            }
        }

        let native = self.chat.tts().voices();
        if !native.is_empty() {
            println!("-- built-in voices:");
            for (i, voice) in native.iter().enumerate() {
                println!("   {i:>3} {}", voice.name);
            }
        }
    }

    async fn list_models(&self) {
        let Some(remote) = &self.remote else {
            println!("-- no TTS server configured");
            return;
        };
        match remote.models().await {
            Ok(models) => {
                println!("-- TTS server models:");
                for model in models {
                    println!("   {:<12} {}", model.key(), model.label());
                }
            }
            Err(e) => println!("-- could not list TTS models: {e}"),
        }
    }
}

async fn next_event(
    events: &mut Option<mpsc::UnboundedReceiver<SpeechEvent>>,
) -> Option<SpeechEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_messages() {
        assert_eq!(Input::parse("  Hello "), Input::Message("Hello".to_string()));
    }

    #[test]
    fn commands_take_arguments() {
        assert_eq!(Input::parse("/lang fr-FR"), Input::Lang("fr-FR".to_string()));
        assert_eq!(Input::parse("/rate   1.5 "), Input::Rate("1.5".to_string()));
        assert_eq!(Input::parse("/model"), Input::Model(String::new()));
        assert_eq!(Input::parse("/test-voice"), Input::TestVoice);
        assert_eq!(Input::parse("/bogus x"), Input::Unknown("bogus".to_string()));
        assert_eq!(
            Input::parse("/native-voice Google UK"),
            Input::NativeVoice("Google UK".to_string())
        );
    }

    #[test]
    fn voice_choice_by_index_or_name() {
        assert_eq!(voice_selector("2"), VoiceSelector::Index(2));
        assert_eq!(
            voice_selector("samantha"),
            VoiceSelector::Name("samantha".to_string())
        );
    }

    #[test]
    fn model_presets_set_rate() {
        assert!((rate_for_model("slow") - 0.7).abs() < f32::EPSILON);
        assert!((rate_for_model("fast") - 1.5).abs() < f32::EPSILON);
        assert!((rate_for_model("default") - 1.0).abs() < f32::EPSILON);
    }
}
