//! Grammar-constrained command recognition

use crate::Result;

/// Turns command-phase audio into finalized phrases
///
/// Implementations are restricted to the command grammar and only return
/// grammar members (or text the dispatcher will reject).
pub trait CommandRecognizer {
    /// Discard any partial utterance and start fresh
    fn reset(&mut self);

    /// Feed one frame
    ///
    /// Returns the finalized phrase once the engine has one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Recognizer`] if the engine failed on this frame
    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>>;

    /// Release the engine
    ///
    /// # Errors
    ///
    /// Returns error if the engine could not be released cleanly
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "vosk")]
pub use self::vosk_engine::{VoskRecognizer, load_model};

#[cfg(feature = "vosk")]
mod vosk_engine {
    use std::path::Path;
    use std::sync::Arc;

    use vosk::{CompleteResult, DecodingState, Model, Recognizer};

    use super::CommandRecognizer;
    use crate::commands::Grammar;
    use crate::voice::capture::SAMPLE_RATE;
    use crate::{Error, Result};

    /// Load a Vosk model directory
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the directory is not a valid model
    pub fn load_model(path: &Path) -> Result<Model> {
        let path_str = path
            .to_str()
            .ok_or_else(|| Error::ResourceInit(format!("non-UTF-8 model path: {}", path.display())))?;
        let model = Model::new(path_str)
            .ok_or_else(|| Error::ResourceInit(format!("cannot load model {}", path.display())))?;
        tracing::debug!(model = %path.display(), "vosk model loaded");
        Ok(model)
    }

    /// Vosk recognizer restricted to the command grammar
    ///
    /// The wake word is consumed before the command phase starts, so the
    /// engine listens for phrase bodies; results are re-prefixed with the wake
    /// word before they are returned.
    pub struct VoskRecognizer {
        recognizer: Recognizer,
        grammar: Arc<Grammar>,
    }

    impl VoskRecognizer {
        /// # Errors
        ///
        /// Returns [`Error::ResourceInit`] if the recognizer cannot be created
        pub fn new(model: &Model, grammar: Arc<Grammar>) -> Result<Self> {
            let mut bodies: Vec<&str> = grammar.bodies().collect();
            bodies.push("[unk]");

            #[allow(clippy::cast_precision_loss)]
            let mut recognizer = Recognizer::new_with_grammar(model, SAMPLE_RATE as f32, &bodies)
                .ok_or_else(|| Error::ResourceInit("vosk command recognizer".to_string()))?;
            recognizer.set_partial_words(false);

            tracing::debug!(phrases = bodies.len() - 1, "vosk command recognizer ready");

            Ok(Self {
                recognizer,
                grammar,
            })
        }
    }

    impl CommandRecognizer for VoskRecognizer {
        fn reset(&mut self) {
            self.recognizer.reset();
        }

        fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>> {
            match self.recognizer.accept_waveform(frame) {
                DecodingState::Failed => Err(Error::Recognizer("vosk decoding failed".to_string())),
                DecodingState::Running => Ok(None),
                DecodingState::Finalized => {
                    let CompleteResult::Single(result) = self.recognizer.final_result() else {
                        return Ok(None);
                    };
                    let text = result.text.trim();
                    if text.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(self.grammar.qualify(text)))
                }
            }
        }
    }
}
