//! Audio capture from microphone
//!
//! [`AudioSource`] is the frame-oriented capture contract the pipeline reads
//! from. [`MicrophoneSource`] implements it on top of cpal: 16 kHz mono,
//! 16-bit PCM, delivered in fixed-size frames.

use std::collections::VecDeque;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig, SupportedBufferSize};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use super::enhance::{self, AudioEffect, EnhancementConfig, StreamSession};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Frame length used when no engine dictates one (32 ms at 16 kHz)
pub const DEFAULT_FRAME_LENGTH: usize = 512;

/// Longest a single `read_frame` call blocks
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Capture callback chunks buffered before new audio is dropped
const CHANNEL_CAPACITY: usize = 256;

/// A single frame read that produced no usable audio
///
/// Always transient: the caller logs it and tries again on the next iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No samples arrived within the read timeout
    #[error("no audio within {0:?}")]
    Timeout(Duration),
    /// The capture stream stopped delivering
    #[error("audio stream closed")]
    Closed,
    /// `read_frame` called before `open` or after `close`
    #[error("audio source not open")]
    NotOpen,
}

/// Frame-oriented audio capture
pub trait AudioSource {
    /// Acquire the capture device and attach enhancements
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the device cannot be opened or does
    /// not become ready; callers must not retry
    fn open(&mut self) -> Result<()>;

    /// Fill `frame` with the next samples
    ///
    /// Returns the number of samples written. Fewer than `frame.len()` is a
    /// short read; zero or an error is transient.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] when no audio could be read this time
    fn read_frame(&mut self, frame: &mut [i16]) -> std::result::Result<usize, FrameError>;

    /// Release enhancements and the device; safe to call more than once
    ///
    /// # Errors
    ///
    /// Returns error if releasing a resource failed; remaining resources are
    /// still released
    fn close(&mut self) -> Result<()>;

    /// Whether the source currently holds an open device
    fn is_open(&self) -> bool;
}

/// Captures from a cpal input device
pub struct MicrophoneSource {
    device_name: Option<String>,
    enhancements: EnhancementConfig,
    stream: Option<Stream>,
    receiver: Option<Receiver<Vec<i16>>>,
    pending: VecDeque<i16>,
    effects: Vec<Box<dyn AudioEffect>>,
}

impl MicrophoneSource {
    /// Create an unopened source
    ///
    /// `device_name` selects an input device by name; `None` uses the host default.
    #[must_use]
    pub fn new(device_name: Option<String>, enhancements: EnhancementConfig) -> Self {
        Self {
            device_name,
            enhancements,
            stream: None,
            receiver: None,
            pending: VecDeque::new(),
            effects: Vec::new(),
        }
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        match &self.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::ResourceInit(format!("cannot list input devices: {e}")))?
                .find(|d| d.name().is_ok_and(|n| n == *name))
                .ok_or_else(|| Error::ResourceInit(format!("input device not found: {name}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::ResourceInit("no input device available".to_string())),
        }
    }

    fn release_effects(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(mut effect) = self.effects.pop() {
            if let Err(e) = effect.release() {
                tracing::warn!(effect = effect.name(), error = %e, "failed to release audio effect");
                first_error.get_or_insert(e);
            } else {
                tracing::debug!(effect = effect.name(), "audio effect released");
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl AudioSource for MicrophoneSource {
    fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = self.find_device(&host)?;
        let device_name = device.name().unwrap_or_default();

        let rate = SampleRate(SAMPLE_RATE);
        let mut ranges: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::ResourceInit(format!("cannot query input configs: {e}")))?
            .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .collect();
        // Prefer mono, downmix anything else
        ranges.sort_by_key(cpal::SupportedStreamConfigRange::channels);
        let supported = ranges.into_iter().next().ok_or_else(|| {
            Error::ResourceInit(format!("{device_name} cannot capture at {SAMPLE_RATE} Hz"))
        })?;

        let buffer_size = match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } => {
                BufferSize::Fixed(min.saturating_mul(2).clamp(*min, *max))
            }
            SupportedBufferSize::Unknown => BufferSize::Default,
        };
        let mut config: StreamConfig = supported.with_sample_rate(rate).config();
        config.buffer_size = buffer_size;
        let channels = usize::from(config.channels.max(1));

        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    forward_chunk(&tx, data, channels);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::ResourceInit(format!("cannot open input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::ResourceInit(format!("input stream not ready: {e}")))?;

        tracing::debug!(
            device = device_name,
            sample_rate = SAMPLE_RATE,
            channels,
            buffer = ?config.buffer_size,
            "audio capture opened"
        );

        self.stream = Some(stream);
        self.receiver = Some(rx);
        self.pending.clear();

        let session = StreamSession {
            device: device_name,
            sample_rate: SAMPLE_RATE,
            channels,
        };
        self.effects = enhance::attach(&self.enhancements, &session);

        Ok(())
    }

    fn read_frame(&mut self, frame: &mut [i16]) -> std::result::Result<usize, FrameError> {
        let receiver = self.receiver.as_ref().ok_or(FrameError::NotOpen)?;

        while self.pending.len() < frame.len() {
            match receiver.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) if self.pending.is_empty() => {
                    return Err(FrameError::Timeout(READ_TIMEOUT));
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Err(FrameError::Closed),
            }
        }

        let count = frame.len().min(self.pending.len());
        for (slot, sample) in frame.iter_mut().zip(self.pending.drain(..count)) {
            *slot = sample;
        }
        for effect in &mut self.effects {
            effect.process(&mut frame[..count]);
        }

        Ok(count)
    }

    fn close(&mut self) -> Result<()> {
        let effects = self.release_effects();

        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "failed to pause input stream");
            }
            drop(stream);
            tracing::debug!("audio capture closed");
        }
        self.receiver = None;
        self.pending.clear();

        effects
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "error closing audio capture");
        }
    }
}

/// Downmix, convert to 16-bit and hand a callback buffer to the reader
fn forward_chunk(tx: &Sender<Vec<i16>>, data: &[f32], channels: usize) {
    let chunk: Vec<i16> = data
        .chunks(channels)
        .map(|frame| {
            #[allow(clippy::cast_precision_loss)]
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            to_i16(mono)
        })
        .collect();

    if let Err(TrySendError::Full(_)) = tx.try_send(chunk) {
        tracing::trace!("capture buffer full, dropping audio");
    }
}

/// Convert f32 [-1.0, 1.0] to i16
#[allow(clippy::cast_possible_truncation)]
fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// RMS energy of a frame, normalized to [0.0, 1.0]
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn frame_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = f64::from(s) / 32768.0;
            v * v
        })
        .sum();
    #[allow(clippy::cast_possible_truncation)]
    let rms = (sum_squares / samples.len() as f64).sqrt() as f32;
    rms
}

/// Encode 16-bit samples as WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
