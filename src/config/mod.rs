//! Configuration management for spot
//!
//! Values are layered: environment variable, then `config.toml`, then the
//! built-in default.

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::commands::{DEFAULT_WAKE_WORD, Grammar};
use crate::media::{MediaBackend, MediaConfig};
use crate::voice::{DEFAULT_FRAME_LENGTH, EnhancementConfig};
use crate::{Error, Result};

/// Default Porcupine keyword file
pub const DEFAULT_KEYWORD_ASSET: &str = "jarvis_linux.ppn";

/// Default Vosk model directory
pub const DEFAULT_RECOGNIZER_MODEL: &str = "vosk-model-small-en-us-0.15";

/// Default wake word sensitivity
pub const DEFAULT_SENSITIVITY: f32 = 0.9;

/// spot configuration
#[derive(Debug)]
pub struct Config {
    /// Wake word every command starts with
    pub wake_word: String,

    /// Wake word engine
    pub keyword: KeywordConfig,

    /// Command recognizer
    pub recognizer: RecognizerConfig,

    /// Capture device and enhancements
    pub audio: AudioConfig,

    /// Player backend
    pub media: MediaConfig,

    /// Directory holding packaged assets
    pub assets_dir: PathBuf,

    /// Private directory assets are materialized into
    pub data_dir: PathBuf,
}

/// Wake word engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotterEngine {
    /// Picovoice Porcupine keyword file
    #[default]
    Porcupine,
    /// Grammar-restricted Vosk recognizer
    Vosk,
}

impl std::str::FromStr for SpotterEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "porcupine" => Ok(Self::Porcupine),
            "vosk" => Ok(Self::Vosk),
            other => Err(format!("unknown wake word engine: {other}")),
        }
    }
}

/// Where the wake word engine runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotterMode {
    /// In the pipeline's capture loop
    #[default]
    Embedded,
    /// On its own listener thread with its own capture
    Background,
}

impl std::str::FromStr for SpotterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "background" => Ok(Self::Background),
            other => Err(format!("unknown wake word mode: {other}")),
        }
    }
}

/// Wake word engine configuration
#[derive(Debug)]
pub struct KeywordConfig {
    pub engine: SpotterEngine,
    pub mode: SpotterMode,
    /// Picovoice access key (from `PICOVOICE_ACCESS_KEY`)
    pub access_key: Option<SecretString>,
    pub keyword_asset: String,
    pub model_asset: Option<String>,
    pub sensitivity: f32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            engine: SpotterEngine::default(),
            mode: SpotterMode::default(),
            access_key: None,
            keyword_asset: DEFAULT_KEYWORD_ASSET.to_string(),
            model_asset: None,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

/// Command recognizer configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    pub model_asset: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_asset: DEFAULT_RECOGNIZER_MODEL.to_string(),
        }
    }
}

/// Audio capture configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Input device name; `None` uses the system default
    pub device: Option<String>,
    pub noise_suppression: bool,
    pub echo_cancellation: bool,
    pub frame_length: usize,
}

impl AudioConfig {
    /// Enhancements to request when the device opens
    #[must_use]
    pub const fn enhancements(&self) -> EnhancementConfig {
        EnhancementConfig {
            noise_suppression: self.noise_suppression,
            echo_cancellation: self.echo_cancellation,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            noise_suppression: true,
            echo_cancellation: true,
            frame_length: DEFAULT_FRAME_LENGTH,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Replace the wake word, e.g. from a command-line override
    ///
    /// # Errors
    ///
    /// Returns error if nothing is left after normalization
    pub fn set_wake_word(&mut self, wake_word: &str) -> Result<()> {
        self.wake_word = parse_wake_word(wake_word)?;
        Ok(())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or unparsable
    pub fn from_sources<F>(fc: file::SpotConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let wake_word = parse_wake_word(
            &env("SPOT_WAKE_WORD")
                .or(fc.wake_word)
                .unwrap_or_else(|| DEFAULT_WAKE_WORD.to_string()),
        )?;

        let keyword = {
            let file = fc.keyword;
            let engine = match env("SPOT_KEYWORD_ENGINE") {
                Some(v) => v.parse().map_err(Error::Config)?,
                None => file.engine.unwrap_or_default(),
            };
            let mode = match env("SPOT_KEYWORD_MODE") {
                Some(v) => v.parse().map_err(Error::Config)?,
                None => file.mode.unwrap_or_default(),
            };
            let sensitivity = match env("SPOT_SENSITIVITY") {
                Some(v) => v
                    .parse::<f32>()
                    .map_err(|e| Error::Config(format!("SPOT_SENSITIVITY: {e}")))?,
                None => file.sensitivity.unwrap_or(DEFAULT_SENSITIVITY),
            };
            if !(0.0..=1.0).contains(&sensitivity) {
                return Err(Error::Config(format!(
                    "sensitivity must be between 0 and 1, got {sensitivity}"
                )));
            }

            KeywordConfig {
                engine,
                mode,
                access_key: env("PICOVOICE_ACCESS_KEY")
                    .or(file.access_key)
                    .filter(|k| !k.is_empty())
                    .map(SecretString::from),
                keyword_asset: file
                    .keyword_asset
                    .unwrap_or_else(|| DEFAULT_KEYWORD_ASSET.to_string()),
                model_asset: file.model_asset,
                sensitivity,
            }
        };

        let recognizer = RecognizerConfig {
            model_asset: fc
                .recognizer
                .model_asset
                .unwrap_or_else(|| DEFAULT_RECOGNIZER_MODEL.to_string()),
        };

        let audio = {
            let default = AudioConfig::default();
            let frame_length = fc.audio.frame_length.unwrap_or(default.frame_length);
            if frame_length == 0 {
                return Err(Error::Config("frame_length must be positive".to_string()));
            }
            AudioConfig {
                device: env("SPOT_AUDIO_DEVICE").or(fc.audio.device),
                noise_suppression: fc
                    .audio
                    .noise_suppression
                    .unwrap_or(default.noise_suppression),
                echo_cancellation: fc
                    .audio
                    .echo_cancellation
                    .unwrap_or(default.echo_cancellation),
                frame_length,
            }
        };

        let media = {
            let default = MediaConfig::default();
            let backend: MediaBackend = match env("SPOT_MEDIA_BACKEND") {
                Some(v) => v.parse().map_err(Error::Config)?,
                None => fc.media.backend.unwrap_or(default.backend),
            };
            MediaConfig {
                backend,
                player: env("SPOT_MEDIA_PLAYER").or(fc.media.player),
                previous_retries: fc
                    .media
                    .previous_retries
                    .unwrap_or(default.previous_retries),
            }
        };

        let assets_dir = env("SPOT_ASSETS_DIR")
            .or(fc.assets_dir)
            .map_or_else(default_assets_dir, PathBuf::from);
        let data_dir = env("SPOT_DATA_DIR")
            .or(fc.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        Ok(Self {
            wake_word,
            keyword,
            recognizer,
            audio,
            media,
            assets_dir,
            data_dir,
        })
    }
}

fn parse_wake_word(raw: &str) -> Result<String> {
    let wake_word = Grammar::canonical_wake_word(raw);
    if wake_word.is_empty() {
        return Err(Error::Config(format!("wake word {raw:?} has no words")));
    }
    Ok(wake_word)
}

/// Packaged assets next to the executable (`<exe dir>/assets`)
fn default_assets_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("assets")))
        .unwrap_or_else(|| PathBuf::from("assets"))
}

/// Private data directory (`~/.local/share/spot` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
        .join("spot")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::file::{KeywordFileConfig, SpotConfigFile};
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_sources(SpotConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.wake_word, "jarvis");
        assert_eq!(config.keyword.engine, SpotterEngine::Porcupine);
        assert_eq!(config.keyword.mode, SpotterMode::Embedded);
        assert_eq!(config.keyword.keyword_asset, "jarvis_linux.ppn");
        assert!((config.keyword.sensitivity - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.recognizer.model_asset, "vosk-model-small-en-us-0.15");
        assert_eq!(config.audio.frame_length, 512);
        assert_eq!(config.media.backend, MediaBackend::Playerctl);
        assert!(config.data_dir.ends_with("spot"));
    }

    #[test]
    fn env_overrides_file() {
        let fc = SpotConfigFile {
            wake_word: Some("computer".to_string()),
            keyword: KeywordFileConfig {
                access_key: Some("from-file".to_string()),
                ..KeywordFileConfig::default()
            },
            ..SpotConfigFile::default()
        };
        let env = env_from(&[
            ("SPOT_WAKE_WORD", "Jarvis"),
            ("PICOVOICE_ACCESS_KEY", "from-env"),
            ("SPOT_MEDIA_BACKEND", "log"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert_eq!(config.wake_word, "jarvis");
        assert_eq!(
            config.keyword.access_key.as_ref().map(|k| k.expose_secret()),
            Some("from-env")
        );
        assert_eq!(config.media.backend, MediaBackend::Log);
    }

    #[test]
    fn file_overrides_default() {
        let fc = SpotConfigFile {
            wake_word: Some("computer".to_string()),
            assets_dir: Some("/opt/spot/assets".to_string()),
            ..SpotConfigFile::default()
        };
        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.wake_word, "computer");
        assert_eq!(config.assets_dir, PathBuf::from("/opt/spot/assets"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let env = env_from(&[("SPOT_SENSITIVITY", "1.5")]);
        assert!(matches!(
            Config::from_sources(SpotConfigFile::default(), env),
            Err(Error::Config(_))
        ));

        let env = env_from(&[("SPOT_KEYWORD_ENGINE", "snowboy")]);
        assert!(Config::from_sources(SpotConfigFile::default(), env).is_err());

        let env = env_from(&[("SPOT_WAKE_WORD", "  ")]);
        assert!(Config::from_sources(SpotConfigFile::default(), env).is_err());
    }

    #[test]
    fn wake_word_is_normalized() {
        let env = env_from(&[("SPOT_WAKE_WORD", "Hey  Jarvis!")]);
        let mut config = Config::from_sources(SpotConfigFile::default(), env).unwrap();
        assert_eq!(config.wake_word, "hey jarvis");

        config.set_wake_word(" Computer, ").unwrap();
        assert_eq!(config.wake_word, "computer");

        assert!(matches!(config.set_wake_word(" !? "), Err(Error::Config(_))));
        assert_eq!(config.wake_word, "computer");
    }
}
