//! MPRIS control through the `playerctl` CLI

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::{MediaConfig, MediaController};
use crate::{Error, Result};

/// Pause between a `previous` request and the track check that follows it
const PREVIOUS_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Drives any MPRIS-capable player (Spotify, mpv, browsers, ...)
#[derive(Debug, Clone)]
pub struct PlayerctlController {
    binary: PathBuf,
    player: Option<String>,
    previous_retries: u32,
    settle_delay: Duration,
}

impl PlayerctlController {
    /// Locate `playerctl` on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if `playerctl` is not installed
    pub fn new(config: &MediaConfig) -> Result<Self> {
        let binary = which::which("playerctl")
            .map_err(|e| Error::Media(format!("playerctl not found: {e}")))?;

        tracing::debug!(binary = %binary.display(), player = ?config.player, "using playerctl");

        Ok(Self::with_binary(binary, config))
    }

    /// Use an explicit `playerctl` binary
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>, config: &MediaConfig) -> Self {
        Self {
            binary: binary.into(),
            player: config.player.clone(),
            previous_retries: config.previous_retries,
            settle_delay: PREVIOUS_SETTLE_DELAY,
        }
    }

    /// Override the delay used by the previous-track retry loop
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Path of the `playerctl` binary in use
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        if let Some(player) = &self.player {
            cmd.arg("--player").arg(player);
        }
        let output = cmd
            .args(args)
            .output()
            .map_err(|e| Error::Media(format!("failed to run playerctl: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Media(format!(
                "playerctl {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn current_title(&self) -> Option<String> {
        self.run(&["metadata", "title"]).ok()
    }

    fn position(&self) -> Result<f64> {
        let raw = self.run(&["position"])?;
        raw.parse::<f64>()
            .map_err(|e| Error::Media(format!("unexpected position {raw:?}: {e}")))
    }
}

impl MediaController for PlayerctlController {
    fn name(&self) -> &'static str {
        "playerctl"
    }

    fn play_pause(&self) -> Result<()> {
        self.run(&["play-pause"]).map(drop)
    }

    fn next(&self) -> Result<()> {
        self.run(&["next"]).map(drop)
    }

    fn previous(&self) -> Result<()> {
        let initial = self.current_title();
        self.run(&["previous"])?;

        // Many players restart the current track on the first "previous"
        for attempt in 0..self.previous_retries {
            std::thread::sleep(self.settle_delay);
            let current = self.current_title();
            if initial.is_none() || current != initial {
                break;
            }
            tracing::debug!(attempt, title = ?current, "track unchanged, retrying previous");
            self.run(&["previous"])?;
        }

        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn seek(&self, delta_seconds: i64) -> Result<()> {
        let target = (self.position()? + delta_seconds as f64).max(0.0);
        tracing::debug!(delta_seconds, target, "seeking");
        self.run(&["position", &format!("{target:.3}")]).map(drop)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Write a fake playerctl that appends its arguments to a log file
    fn fake_playerctl(dir: &Path, title: &str, position: &str) -> PathBuf {
        let log = dir.join("calls.log");
        let script = dir.join("playerctl");
        let body = format!(
            "#!/bin/sh\necho \"$*\" >> {log}\ncase \"$*\" in\n  *\"metadata title\"*) echo \"{title}\" ;;\n  position) echo \"{position}\" ;;\nesac\n",
            log = log.display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn play_pause_passes_player() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_playerctl(dir.path(), "Song", "0");
        let config = MediaConfig {
            player: Some("spotify".to_string()),
            ..MediaConfig::default()
        };
        let controller = PlayerctlController::with_binary(binary, &config);

        controller.play_pause().unwrap();
        assert_eq!(calls(dir.path()), vec!["--player spotify play-pause"]);
    }

    #[test]
    fn rewind_clamps_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_playerctl(dir.path(), "Song", "4.5");
        let controller = PlayerctlController::with_binary(binary, &MediaConfig::default());

        controller.seek(-10).unwrap();
        assert_eq!(calls(dir.path()), vec!["position", "position 0.000"]);
    }

    #[test]
    fn skip_adds_to_position() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_playerctl(dir.path(), "Song", "30");
        let controller = PlayerctlController::with_binary(binary, &MediaConfig::default());

        controller.seek(15).unwrap();
        assert_eq!(calls(dir.path()), vec!["position", "position 45.000"]);
    }

    #[test]
    fn previous_retries_while_track_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_playerctl(dir.path(), "Same Song", "0");
        let controller = PlayerctlController::with_binary(binary, &MediaConfig::default())
            .with_settle_delay(Duration::ZERO);

        controller.previous().unwrap();
        let previous_calls = calls(dir.path())
            .iter()
            .filter(|c| c.as_str() == "previous")
            .count();
        assert_eq!(previous_calls, 3);
    }

    #[test]
    fn failing_player_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("playerctl");
        std::fs::write(&script, "#!/bin/sh\necho 'No players found' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let controller = PlayerctlController::with_binary(script, &MediaConfig::default());

        let err = controller.next().unwrap_err();
        assert!(err.to_string().contains("No players found"));
    }
}
