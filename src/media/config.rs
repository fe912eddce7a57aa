//! Configuration for the media-control backend

use serde::{Deserialize, Serialize};

/// Which player backend receives playback commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    /// MPRIS players through the `playerctl` CLI
    #[default]
    Playerctl,
    /// Log actions without touching any player
    Log,
}

impl std::str::FromStr for MediaBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "playerctl" | "mpris" => Ok(Self::Playerctl),
            "log" | "dry-run" | "none" => Ok(Self::Log),
            other => Err(format!("unknown media backend: {other}")),
        }
    }
}

/// Media-control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Backend receiving commands
    pub backend: MediaBackend,
    /// Restrict playerctl to one player (e.g. "spotify")
    pub player: Option<String>,
    /// Extra `previous` attempts when the player only restarted the track
    pub previous_retries: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            backend: MediaBackend::Playerctl,
            player: None,
            previous_retries: 2,
        }
    }
}
