//! spot - hands-free voice control for media playback
//!
//! Say the wake word, then a short command ("jarvis skip twenty"), and spot
//! drives the active media player.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    AudioSource                        │
//! │     microphone  →  noise suppression  →  frames       │
//! └─────────────────────────┬────────────────────────────┘
//!                           │
//! ┌─────────────────────────▼────────────────────────────┐
//! │                 Pipeline worker                       │
//! │   HOTWORD: KeywordSpotter  │  COMMAND: Recognizer     │
//! └─────────────────────────┬────────────────────────────┘
//!                           │ phrase
//! ┌─────────────────────────▼────────────────────────────┐
//! │   CommandDispatcher  →  MediaController (playerctl)   │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod assets;
pub mod commands;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod setup;
pub mod voice;

pub use assets::AssetLoader;
pub use commands::{CommandDispatcher, DispatchError, Grammar, MediaAction};
pub use config::Config;
pub use error::{Error, Result};
pub use media::MediaController;
pub use voice::{Pipeline, PipelineEvent, PipelineState};
