//! Media-control capability
//!
//! The dispatcher talks to players only through [`MediaController`], which is
//! injected at construction time. Backends:
//! - [`PlayerctlController`] drives MPRIS players via `playerctl`
//! - [`LoggingController`] only logs (dry run)

mod config;
mod log;
mod playerctl;

use std::sync::Arc;

pub use config::{MediaBackend, MediaConfig};
pub use log::LoggingController;
pub use playerctl::PlayerctlController;

use crate::Result;

/// Playback operations a player backend must provide
///
/// Implementations are called from the pipeline worker thread.
pub trait MediaController: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Toggle between playing and paused
    ///
    /// # Errors
    ///
    /// Returns error if the player rejects the request
    fn play_pause(&self) -> Result<()>;

    /// Skip to the next track
    ///
    /// # Errors
    ///
    /// Returns error if the player rejects the request
    fn next(&self) -> Result<()>;

    /// Go back to the previous track
    ///
    /// # Errors
    ///
    /// Returns error if the player rejects the request
    fn previous(&self) -> Result<()>;

    /// Seek relative to the current position
    ///
    /// The resulting absolute position is clamped at zero.
    ///
    /// # Errors
    ///
    /// Returns error if the player rejects the request
    fn seek(&self, delta_seconds: i64) -> Result<()>;
}

/// Build the configured controller
///
/// # Errors
///
/// Returns error if the backend is unavailable (e.g. `playerctl` not installed)
pub fn controller_from_config(config: &MediaConfig) -> Result<Arc<dyn MediaController>> {
    match config.backend {
        MediaBackend::Playerctl => Ok(Arc::new(PlayerctlController::new(config)?)),
        MediaBackend::Log => Ok(Arc::new(LoggingController::new())),
    }
}
