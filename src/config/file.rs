//! TOML configuration file loading
//!
//! Supports `~/.config/spot/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{SpotterEngine, SpotterMode};
use crate::media::MediaBackend;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SpotConfigFile {
    /// Wake word every command starts with (e.g. "jarvis")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_word: Option<String>,

    /// Packaged asset directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assets_dir: Option<String>,

    /// Private data directory assets are copied into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Wake word engine
    #[serde(default)]
    pub keyword: KeywordFileConfig,

    /// Command recognizer
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// Capture device and enhancements
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Player backend
    #[serde(default)]
    pub media: MediaFileConfig,
}

/// Wake word engine configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct KeywordFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<SpotterEngine>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<SpotterMode>,

    /// Picovoice access key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Keyword file name inside the assets directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_asset: Option<String>,

    /// Engine model file name inside the assets directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_asset: Option<String>,

    /// Detection sensitivity in `[0.0, 1.0]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f32>,
}

/// Command recognizer configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RecognizerFileConfig {
    /// Model directory name inside the assets directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_asset: Option<String>,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AudioFileConfig {
    /// Input device name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_suppression: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub echo_cancellation: Option<bool>,

    /// Samples per frame when the engine does not dictate one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_length: Option<usize>,
}

/// Media backend configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MediaFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<MediaBackend>,

    /// Restrict control to one player (e.g. "spotify")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_retries: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SpotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SpotConfigFile {
    config_file_path().map_or_else(SpotConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `SpotConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> SpotConfigFile {
    if !path.exists() {
        return SpotConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SpotConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SpotConfigFile::default()
        }
    }
}

/// Write a config file, creating its parent directory
///
/// # Errors
///
/// Returns error if the file cannot be serialized or written
pub fn write_config_file(path: &Path, config: &SpotConfigFile) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml = toml::to_string_pretty(config)
        .map_err(|e| crate::Error::Config(format!("cannot serialize config: {e}")))?;
    std::fs::write(path, toml)?;

    Ok(())
}

/// Return the config file path: `~/.config/spot/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("spot").join("config.toml"))
}
