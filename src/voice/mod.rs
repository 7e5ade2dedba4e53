//! Voice processing module
//!
//! Speech output (remote TTS with native fallback, cpal playback) and speech
//! input (microphone capture, HTTP STT, recognition lifecycle).

mod capture;
mod generation;
mod media;
mod playback;
mod recognizer;
mod remote;
mod speech;
mod synthesis;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, has_input_device, rms, samples_to_wav};
pub use generation::{Generation, Ticket};
pub use media::{AudioFormat, AudioOutput, EncodedAudio, MediaResource, Pcm, ReadyState};
pub use playback::{CpalOutput, CpalTrack};
pub use recognizer::{
    HttpRecognizer, RecognitionErrorCode, RecognitionEvent, RecognitionSettings, Recognizer,
    Segment, SttClient, UtteranceSegmenter,
};
pub use remote::{
    RemoteModel, RemoteTts, RemoteVoice, SynthesisRequest, TtsBackend, default_voices,
};
pub use speech::{SUPPORTED_LANGUAGES, SpeechError, SpeechEvent, SpeechHandler};
#[cfg(feature = "system-voices")]
pub use synthesis::SystemSynthesizer;
pub use synthesis::{SpeechSynthesizer, Utterance, VoiceInfo, preferred_voice};
pub use tts::{
    PITCH_RANGE, RATE_RANGE, ReadinessPolicy, TtsHandler, TtsSettings, VOLUME_RANGE,
    VoiceSelector,
};
