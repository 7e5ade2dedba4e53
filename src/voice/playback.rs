//! Audio playback to speakers
//!
//! [`CpalOutput`] is the host [`AudioOutput`]: each loaded track decodes on
//! a worker thread and plays on its own thread, since cpal streams are not
//! `Send`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::media::{AudioOutput, EncodedAudio, MediaResource, Pcm, ReadyState};
use crate::{Error, Result};

/// Poll interval of the playback thread
const PLAYBACK_POLL: Duration = Duration::from_millis(20);

/// Plays audio to the default output device
pub struct CpalOutput;

impl CpalOutput {
    /// Create a new audio output, failing when no output device exists
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio output initialized"
        );
        Ok(Self)
    }
}

impl AudioOutput for CpalOutput {
    fn load(&self, audio: EncodedAudio) -> Result<Box<dyn MediaResource>> {
        Ok(Box::new(CpalTrack::spawn_decode(audio)))
    }
}

const STATE_NOTHING: u8 = 0;
const STATE_ENOUGH: u8 = 3;
const STATE_FAILED: u8 = u8::MAX;

/// State shared between a track and its worker threads
#[derive(Default)]
struct TrackShared {
    ready: AtomicU8,
    pcm: Mutex<Option<Pcm>>,
    error: Mutex<Option<String>>,
    stop: AtomicBool,
    ended: AtomicBool,
}

/// One decoded utterance on the default output device
pub struct CpalTrack {
    shared: Arc<TrackShared>,
    started: bool,
}

impl CpalTrack {
    fn spawn_decode(audio: EncodedAudio) -> Self {
        let shared = Arc::new(TrackShared::default());
        let worker = Arc::clone(&shared);

        std::thread::spawn(move || match Pcm::decode(&audio) {
            Ok(pcm) => {
                tracing::debug!(
                    duration_ms = pcm.duration_ms(),
                    sample_rate = pcm.sample_rate,
                    "audio decoded"
                );
                if let Ok(mut slot) = worker.pcm.lock() {
                    *slot = Some(pcm);
                }
                worker.ready.store(STATE_ENOUGH, Ordering::Release);
            }
            Err(e) => {
                if let Ok(mut slot) = worker.error.lock() {
                    *slot = Some(e.to_string());
                }
                worker.ready.store(STATE_FAILED, Ordering::Release);
            }
        });

        Self {
            shared,
            started: false,
        }
    }
}

impl MediaResource for CpalTrack {
    fn ready_state(&self) -> Result<ReadyState> {
        match self.shared.ready.load(Ordering::Acquire) {
            STATE_NOTHING => Ok(ReadyState::HaveNothing),
            STATE_ENOUGH => Ok(ReadyState::HaveEnoughData),
            STATE_FAILED => {
                let message = self
                    .shared
                    .error
                    .lock()
                    .ok()
                    .and_then(|e| e.clone())
                    .unwrap_or_else(|| "decode failed".to_string());
                Err(Error::Audio(message))
            }
            _ => Ok(ReadyState::HaveMetadata),
        }
    }

    fn play(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let pcm = self
            .shared
            .pcm
            .lock()
            .map_err(|_| Error::Audio("track state poisoned".to_string()))?
            .take()
            .ok_or_else(|| Error::Audio("track not ready".to_string()))?;

        self.started = true;
        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || {
            if let Err(e) = play_blocking(&pcm, &shared) {
                tracing::error!(error = %e, "audio playback failed");
            }
            shared.ended.store(true, Ordering::Release);
        });

        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if !self.started {
            self.shared.ended.store(true, Ordering::Release);
        }
    }
}

impl Drop for CpalTrack {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}

/// Play samples on the current thread until done or stopped
fn play_blocking(pcm: &Pcm, shared: &TrackShared) -> Result<()> {
    if pcm.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let (config, samples) = output_config(&device, pcm)?;
    let channels = usize::from(config.channels);
    let total = samples.len();

    let samples = Arc::new(samples);
    let position = Arc::new(Mutex::new(0usize));
    let samples_cb = Arc::clone(&samples);
    let position_cb = Arc::clone(&position);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let Ok(mut pos) = position_cb.lock() else {
                    return;
                };
                for frame in data.chunks_mut(channels) {
                    let sample = samples_cb.get(*pos).copied().unwrap_or(0.0);
                    frame.fill(sample);
                    if *pos < samples_cb.len() {
                        *pos += 1;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    loop {
        if shared.stop.load(Ordering::Acquire) {
            tracing::debug!("playback stopped");
            break;
        }
        let played = position.lock().map_or(total, |p| *p);
        if played >= total {
            // let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
            break;
        }
        std::thread::sleep(PLAYBACK_POLL);
    }

    drop(stream);
    tracing::debug!(samples = total, "playback complete");
    Ok(())
}

/// Pick an output config for `pcm`, resampling when the device can't match its rate
fn output_config(device: &cpal::Device, pcm: &Pcm) -> Result<(StreamConfig, Vec<f32>)> {
    let rate = SampleRate(pcm.sample_rate);
    let matching = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.channels() <= 2)
        .find(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate);

    if let Some(range) = matching {
        return Ok((range.with_sample_rate(rate).config(), pcm.samples.clone()));
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    let config = fallback.config();
    let resampled = resample(&pcm.samples, pcm.sample_rate, config.sample_rate.0)?;

    tracing::debug!(
        from = pcm.sample_rate,
        to = config.sample_rate.0,
        "resampled for output device"
    );
    Ok((config, resampled))
}

/// Resample audio using rubato
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::new();
    for chunk in samples.chunks(chunk_size) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        block.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 24000, 24000).unwrap(), samples);
    }

    #[test]
    fn resample_changes_length_by_ratio() {
        let samples = vec![0.0f32; 4096];
        let out = resample(&samples, 24000, 48000).unwrap();
        // four full chunks in, roughly twice as many frames out
        assert!(out.len() > 6000 && out.len() <= 8192);
    }
}
