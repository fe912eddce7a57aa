//! Capture-side audio enhancements
//!
//! Effects are attached to a [`MicrophoneSource`](super::MicrophoneSource)
//! right after the device opens and released before it closes. An effect
//! that is unavailable on the current host is logged and skipped; it never
//! fails startup.

use super::capture::frame_rms;
use crate::Result;

/// Which enhancements to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancementConfig {
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            noise_suppression: true,
            echo_cancellation: true,
        }
    }
}

/// Properties of the opened capture stream
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub device: String,
    pub sample_rate: u32,
    pub channels: usize,
}

/// In-place processing applied to every captured frame
pub trait AudioEffect {
    fn name(&self) -> &'static str;

    /// Process a mono 16-bit frame in place
    fn process(&mut self, frame: &mut [i16]);

    /// Release anything the effect holds
    ///
    /// # Errors
    ///
    /// Returns error if the effect could not be released cleanly
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Attach every requested effect that is available
#[must_use]
pub fn attach(config: &EnhancementConfig, session: &StreamSession) -> Vec<Box<dyn AudioEffect>> {
    let mut effects: Vec<Box<dyn AudioEffect>> = Vec::new();

    if config.echo_cancellation {
        // cpal exposes no platform echo canceller
        tracing::warn!(
            device = %session.device,
            "acoustic echo cancellation not available, continuing without it"
        );
    }

    if config.noise_suppression {
        effects.push(Box::new(NoiseSuppressor::new()));
        tracing::debug!(device = %session.device, sample_rate = session.sample_rate, "noise suppression attached");
    }

    effects
}

/// Frames below this multiple of the noise floor are treated as noise
const GATE_RATIO: f32 = 2.0;

/// Gain applied to gated frames
const ATTENUATION: f32 = 0.25;

/// How fast the floor follows louder input (per frame)
const FLOOR_RISE: f32 = 0.005;

/// Lowest floor the estimate may fall to
const MIN_FLOOR: f32 = 1.0e-4;

/// Adaptive noise gate
///
/// Tracks the background level with a fast-fall, slow-rise floor estimate and
/// attenuates frames that do not rise clearly above it.
#[derive(Debug, Clone)]
pub struct NoiseSuppressor {
    floor: Option<f32>,
}

impl NoiseSuppressor {
    #[must_use]
    pub const fn new() -> Self {
        Self { floor: None }
    }

    /// Current noise floor estimate (normalized RMS)
    #[must_use]
    pub const fn noise_floor(&self) -> Option<f32> {
        self.floor
    }
}

impl Default for NoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for NoiseSuppressor {
    fn name(&self) -> &'static str {
        "noise-suppressor"
    }

    fn process(&mut self, frame: &mut [i16]) {
        if frame.is_empty() {
            return;
        }

        let level = frame_rms(frame);
        let floor = match self.floor {
            None => level,
            Some(floor) if level < floor => level,
            Some(floor) => floor * (1.0 + FLOOR_RISE),
        }
        .max(MIN_FLOOR);
        self.floor = Some(floor);

        if level < floor * GATE_RATIO {
            for sample in frame.iter_mut() {
                #[allow(clippy::cast_possible_truncation)]
                let scaled = (f32::from(*sample) * ATTENUATION) as i16;
                *sample = scaled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: i16, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[test]
    fn attenuates_steady_background() {
        let mut ns = NoiseSuppressor::new();
        let mut frame = tone(200, 512);
        ns.process(&mut frame);
        assert_eq!(frame[0], 50);
    }

    #[test]
    fn passes_speech_above_floor() {
        let mut ns = NoiseSuppressor::new();
        for _ in 0..10 {
            ns.process(&mut tone(200, 512));
        }

        let mut loud = tone(8000, 512);
        ns.process(&mut loud);
        assert_eq!(loud[0], 8000);
        assert_eq!(loud[1], -8000);
    }

    #[test]
    fn floor_falls_immediately() {
        let mut ns = NoiseSuppressor::new();
        ns.process(&mut tone(4000, 512));
        let high = ns.noise_floor().unwrap();
        ns.process(&mut tone(100, 512));
        assert!(ns.noise_floor().unwrap() < high / 10.0);
    }

    #[test]
    fn attach_respects_config() {
        let session = StreamSession {
            device: "test".to_string(),
            sample_rate: 16000,
            channels: 1,
        };
        let none = EnhancementConfig {
            noise_suppression: false,
            echo_cancellation: false,
        };
        assert!(attach(&none, &session).is_empty());

        let effects = attach(&EnhancementConfig::default(), &session);
        assert_eq!(effects.len(), 1);
        assert_eq!(effects[0].name(), "noise-suppressor");
    }
}
