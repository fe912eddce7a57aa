//! Voice processing module
//!
//! Audio capture, wake word spotting, grammar-constrained command
//! recognition and the pipeline that ties them together.

mod capture;
mod enhance;
mod engines;
mod pipeline;
mod recognizer;
mod wake_word;

pub use capture::{
    AudioSource, DEFAULT_FRAME_LENGTH, FrameError, MicrophoneSource, SAMPLE_RATE, frame_rms,
    samples_to_wav,
};
pub use enhance::{AudioEffect, EnhancementConfig, NoiseSuppressor, StreamSession};
pub use engines::{ConfiguredEngines, EngineFactory};
pub use pipeline::{
    COMMAND_TIMEOUT, PhaseMachine, Pipeline, PipelineEvent, PipelineResources, PipelineState,
    Transition,
};
pub use recognizer::CommandRecognizer;
#[cfg(feature = "vosk")]
pub use recognizer::{VoskRecognizer, load_model};
#[cfg(feature = "porcupine")]
pub use wake_word::PorcupineSpotter;
#[cfg(feature = "vosk")]
pub use wake_word::VoskSpotter;
pub use wake_word::{BackgroundSpotter, KeywordSpotter, ListenerParts};
