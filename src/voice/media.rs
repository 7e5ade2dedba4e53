//! Playable media resources
//!
//! A [`MediaResource`] is the native stand-in for an audio element: it is
//! loaded from encoded bytes, reports how much of the audio is ready, and
//! plays until it ends or is stopped. Dropping a resource releases it.

use std::io::Cursor;

use crate::{Error, Result};

/// How much of a resource is buffered, mirroring media element ready states
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    /// Nothing decoded yet
    HaveNothing,
    /// Format and duration known
    HaveMetadata,
    /// Enough to start, not necessarily to finish
    HaveCurrentData,
    /// Playback can run to the end without stalling
    HaveEnoughData,
}

/// A loaded, playable audio resource
pub trait MediaResource: Send {
    /// Current readiness
    ///
    /// # Errors
    ///
    /// Returns error if the audio could not be decoded
    fn ready_state(&self) -> Result<ReadyState>;

    /// Start playback; returns immediately
    ///
    /// # Errors
    ///
    /// Returns error if the resource is not ready or the device fails
    fn play(&mut self) -> Result<()>;

    /// Whether playback has finished (or was stopped)
    fn is_ended(&self) -> bool;

    /// Pause playback for good
    fn stop(&mut self);
}

/// Host capability that turns encoded audio into playable resources
pub trait AudioOutput: Send + Sync {
    /// Decode `audio` into a new resource
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be attached to a resource
    fn load(&self, audio: EncodedAudio) -> Result<Box<dyn MediaResource>>;
}

/// Container format of encoded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Encoded audio as returned by a TTS backend
#[derive(Debug, Clone)]
pub struct EncodedAudio {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl EncodedAudio {
    #[must_use]
    pub const fn new(bytes: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
        }
    }

    /// Detect the container from the content type, then from magic bytes
    #[must_use]
    pub fn format(&self) -> Option<AudioFormat> {
        if let Some(ct) = self.content_type.as_deref() {
            let ct = ct.to_ascii_lowercase();
            if ct.contains("wav") {
                return Some(AudioFormat::Wav);
            }
            if ct.contains("mpeg") || ct.contains("mp3") {
                return Some(AudioFormat::Mp3);
            }
        }

        match self.bytes.as_slice() {
            [b'R', b'I', b'F', b'F', ..] => Some(AudioFormat::Wav),
            [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
            _ => None,
        }
    }
}

/// Decoded mono PCM
#[derive(Debug, Clone, Default)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Pcm {
    /// Decode encoded audio to mono f32 samples
    ///
    /// # Errors
    ///
    /// Returns error if the format is unknown or decoding fails
    pub fn decode(audio: &EncodedAudio) -> Result<Self> {
        match audio.format() {
            Some(AudioFormat::Wav) => decode_wav(&audio.bytes),
            Some(AudioFormat::Mp3) => decode_mp3(&audio.bytes),
            None => Err(Error::Audio(format!(
                "unrecognised audio format ({})",
                audio.content_type.as_deref().unwrap_or("no content type")
            ))),
        }
    }

    /// Duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// Decode WAV bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<Pcm> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    Ok(Pcm {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss)]
fn decode_mp3(data: &[u8]) -> Result<Pcm> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let frame_samples: Vec<f32> =
                    frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&frame_samples, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("MP3 stream contained no frames".to_string()));
    }

    Ok(Pcm {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels down to mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
