//! Dry-run controller

use super::MediaController;
use crate::Result;

/// Logs every request instead of controlling a player
#[derive(Debug, Default)]
pub struct LoggingController;

impl LoggingController {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MediaController for LoggingController {
    fn name(&self) -> &'static str {
        "log"
    }

    fn play_pause(&self) -> Result<()> {
        tracing::info!("media: play/pause");
        Ok(())
    }

    fn next(&self) -> Result<()> {
        tracing::info!("media: next track");
        Ok(())
    }

    fn previous(&self) -> Result<()> {
        tracing::info!("media: previous track");
        Ok(())
    }

    fn seek(&self, delta_seconds: i64) -> Result<()> {
        tracing::info!(delta_seconds, "media: seek");
        Ok(())
    }
}
