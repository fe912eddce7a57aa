//! Engine construction from configuration
//!
//! The pipeline builds its resources through [`EngineFactory`] on its worker
//! thread, so tests can substitute scripted engines and capture sources.

use std::path::PathBuf;
use std::sync::Arc;
#[cfg(any(feature = "vosk", test))]
use std::sync::{Mutex, PoisonError};

use super::capture::{AudioSource, MicrophoneSource};
use super::recognizer::CommandRecognizer;
use super::wake_word::{BackgroundSpotter, KeywordSpotter};
use crate::assets::AssetLoader;
use crate::commands::Grammar;
use crate::config::{Config, SpotterEngine, SpotterMode};
use crate::{Error, Result};

/// Builds the engines and capture source one pipeline run owns
pub trait EngineFactory: Send + Sync {
    /// Wake word engine
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the engine or its assets are unavailable
    fn spotter(&self) -> Result<Box<dyn KeywordSpotter>>;

    /// Command recognizer restricted to the grammar
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the engine or its model is unavailable
    fn recognizer(&self) -> Result<Box<dyn CommandRecognizer>>;

    /// Unopened capture source
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if no source can be constructed
    fn source(&self) -> Result<Box<dyn AudioSource>>;
}

/// Engines selected by [`Config`]
#[derive(Clone)]
pub struct ConfiguredEngines {
    config: Arc<Config>,
    grammar: Arc<Grammar>,
    loader: AssetLoader,
    #[cfg(feature = "vosk")]
    vosk_model: LoadOnce<vosk::Model>,
}

/// A value loaded on first use and shared by every clone afterwards
#[cfg(any(feature = "vosk", test))]
struct LoadOnce<T> {
    slot: Arc<Mutex<Option<Arc<T>>>>,
}

#[cfg(any(feature = "vosk", test))]
impl<T> LoadOnce<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the shared value, running `load` only if nothing is held yet
    fn get_or_load(&self, load: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = slot.as_ref() {
            return Ok(Arc::clone(value));
        }
        let value = Arc::new(load()?);
        *slot = Some(Arc::clone(&value));
        Ok(value)
    }
}

#[cfg(any(feature = "vosk", test))]
impl<T> Clone for LoadOnce<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl ConfiguredEngines {
    #[must_use]
    pub fn new(config: Arc<Config>, grammar: Arc<Grammar>) -> Self {
        let loader = AssetLoader::new(&config.assets_dir, &config.data_dir);
        Self {
            config,
            grammar,
            loader,
            #[cfg(feature = "vosk")]
            vosk_model: LoadOnce::new(),
        }
    }

    /// The Vosk model, loaded once for both the wake engine and the recognizer
    #[cfg(feature = "vosk")]
    fn vosk_model(&self) -> Result<Arc<vosk::Model>> {
        self.vosk_model.get_or_load(|| {
            let model_dir = self.loader.copy_if_absent(&self.config.recognizer.model_asset)?;
            super::recognizer::load_model(&model_dir)
        })
    }

    /// Names of every asset the configured engines load
    #[must_use]
    pub fn required_assets(&self) -> Vec<String> {
        let keyword = &self.config.keyword;
        let mut assets = Vec::new();
        if keyword.engine == SpotterEngine::Porcupine {
            assets.push(keyword.keyword_asset.clone());
            assets.extend(keyword.model_asset.clone());
        }
        assets.push(self.config.recognizer.model_asset.clone());
        assets
    }

    /// Copy every required asset into the data directory
    ///
    /// # Errors
    ///
    /// Returns error on the first asset that cannot be materialized
    pub fn materialize_assets(&self) -> Result<Vec<PathBuf>> {
        self.required_assets()
            .iter()
            .map(|name| self.loader.copy_if_absent(name))
            .collect()
    }

    fn embedded_spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        match self.config.keyword.engine {
            SpotterEngine::Porcupine => self.porcupine_spotter(),
            SpotterEngine::Vosk => self.vosk_spotter(),
        }
    }

    fn microphone(&self) -> MicrophoneSource {
        MicrophoneSource::new(
            self.config.audio.device.clone(),
            self.config.audio.enhancements(),
        )
    }

    #[cfg(feature = "porcupine")]
    fn porcupine_spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        let keyword = &self.config.keyword;
        let access_key = keyword.access_key.as_ref().ok_or_else(|| {
            Error::ResourceInit("porcupine needs PICOVOICE_ACCESS_KEY".to_string())
        })?;
        let keyword_path = self.loader.copy_if_absent(&keyword.keyword_asset)?;
        let model_path = keyword
            .model_asset
            .as_deref()
            .map(|name| self.loader.copy_if_absent(name))
            .transpose()?;

        Ok(Box::new(super::wake_word::PorcupineSpotter::new(
            access_key,
            &keyword_path,
            model_path.as_deref(),
            keyword.sensitivity,
        )?))
    }

    #[cfg(not(feature = "porcupine"))]
    #[allow(clippy::unused_self)]
    fn porcupine_spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        Err(not_compiled("porcupine"))
    }

    #[cfg(feature = "vosk")]
    fn vosk_spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        let model = self.vosk_model()?;
        Ok(Box::new(super::wake_word::VoskSpotter::new(
            &model,
            self.grammar.wake_word(),
            self.config.audio.frame_length,
        )?))
    }

    #[cfg(not(feature = "vosk"))]
    #[allow(clippy::unused_self)]
    fn vosk_spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        Err(not_compiled("vosk"))
    }
}

impl EngineFactory for ConfiguredEngines {
    fn spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        match self.config.keyword.mode {
            SpotterMode::Embedded => self.embedded_spotter(),
            SpotterMode::Background => {
                let engines = self.clone();
                let spotter = BackgroundSpotter::spawn(self.config.audio.frame_length, move || {
                    let spotter = engines.embedded_spotter()?;
                    let source: Box<dyn AudioSource> = Box::new(engines.microphone());
                    Ok((source, spotter))
                })?;
                Ok(Box::new(spotter))
            }
        }
    }

    #[cfg(feature = "vosk")]
    fn recognizer(&self) -> Result<Box<dyn CommandRecognizer>> {
        let model = self.vosk_model()?;
        Ok(Box::new(super::recognizer::VoskRecognizer::new(
            &model,
            Arc::clone(&self.grammar),
        )?))
    }

    #[cfg(not(feature = "vosk"))]
    fn recognizer(&self) -> Result<Box<dyn CommandRecognizer>> {
        tracing::debug!(phrases = self.grammar.len(), "no command recognizer available");
        Err(not_compiled("vosk"))
    }

    fn source(&self) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(self.microphone()))
    }
}

#[cfg(any(not(feature = "porcupine"), not(feature = "vosk")))]
fn not_compiled(engine: &str) -> Error {
    Error::ResourceInit(format!(
        "{engine} support not compiled in, rebuild with --features {engine}"
    ))
}
