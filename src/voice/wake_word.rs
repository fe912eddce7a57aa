//! Wake word detection
//!
//! Every wake engine sits behind [`KeywordSpotter`]. Two deployments are
//! interchangeable:
//!
//! - **Embedded**: the pipeline feeds frames from its own capture loop
//!   straight into an engine ([`PorcupineSpotter`], [`VoskSpotter`]).
//! - **Background**: [`BackgroundSpotter`] runs an engine on its own thread
//!   with its own capture source and reports detections through a callback
//!   channel; the pipeline polls it with the same `process` call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use super::capture::{AudioSource, FrameError};
use crate::{Error, Result};

/// Detections older than this are dropped instead of reported
const DETECTION_TTL: Duration = Duration::from_millis(500);

/// Back-off after the listener's capture stream closes
const CLOSED_BACKOFF: Duration = Duration::from_millis(50);

/// Detects a fixed set of wake phrases, one frame at a time
pub trait KeywordSpotter {
    /// Number of samples the engine consumes per call
    fn frame_length(&self) -> usize;

    /// Run the engine on one frame
    ///
    /// Returns the index of the detected keyword, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WakeWord`] if the engine failed on this frame
    fn try_process(&mut self, frame: &[i16]) -> Result<Option<usize>>;

    /// Run the engine on one frame, treating failure as "no match"
    fn process(&mut self, frame: &[i16]) -> Option<usize> {
        self.try_process(frame).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "wake word processing failed");
            None
        })
    }

    /// Release the engine
    ///
    /// # Errors
    ///
    /// Returns error if the engine could not be released cleanly
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Capture source and engine owned by a background listener
pub type ListenerParts = (Box<dyn AudioSource>, Box<dyn KeywordSpotter>);

#[derive(Debug, Clone, Copy)]
struct Detection {
    keyword: usize,
    at: Instant,
}

/// Always-on listener running on its own thread
///
/// The listener owns its capture source and engine; both are built on the
/// listener thread. Each detection is delivered through a callback that
/// queues it for the next [`KeywordSpotter::process`] call.
pub struct BackgroundSpotter {
    frame_length: usize,
    detections: Receiver<Detection>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundSpotter {
    /// Start the listener
    ///
    /// `frame_length` is the frame size reported to the pipeline. `build`
    /// runs on the listener thread and returns the capture source and engine.
    /// Returns once the listener has opened its source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if the listener failed to start
    pub fn spawn<F>(frame_length: usize, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<ListenerParts> + Send + 'static,
    {
        let (detection_tx, detections) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let worker = std::thread::Builder::new()
            .name("spot-wake-listener".to_string())
            .spawn(move || {
                let on_detection = move |keyword: usize| {
                    let _ = detection_tx.send(Detection {
                        keyword,
                        at: Instant::now(),
                    });
                };
                listen(build, &thread_stop, &ready_tx, on_detection);
            })
            .map_err(|e| Error::ResourceInit(format!("cannot start wake listener: {e}")))?;

        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(Error::ResourceInit(
                "wake listener exited during startup".to_string(),
            ))
        });

        match ready {
            Ok(()) => {
                tracing::info!("background wake listener started");
                Ok(Self {
                    frame_length,
                    detections,
                    stop,
                    worker: Some(worker),
                })
            }
            Err(e) => {
                let _ = worker.join();
                Err(e)
            }
        }
    }
}

/// Listener thread body
fn listen<F, C>(build: F, stop: &AtomicBool, ready: &Sender<Result<()>>, on_detection: C)
where
    F: FnOnce() -> Result<ListenerParts>,
    C: Fn(usize),
{
    let (mut source, mut spotter) = match build().and_then(|(mut source, spotter)| {
        source.open()?;
        Ok((source, spotter))
    }) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let mut frame = vec![0i16; spotter.frame_length()];
    while !stop.load(Ordering::SeqCst) {
        match source.read_frame(&mut frame) {
            Ok(n) if n == frame.len() => {
                if let Some(keyword) = spotter.process(&frame) {
                    tracing::debug!(keyword, "wake word detected by listener");
                    on_detection(keyword);
                }
            }
            Ok(_) => {}
            Err(FrameError::Closed) => {
                tracing::debug!("listener capture closed");
                std::thread::sleep(CLOSED_BACKOFF);
            }
            Err(e) => tracing::trace!(error = %e, "listener frame skipped"),
        }
    }

    if let Err(e) = spotter.release() {
        tracing::warn!(error = %e, "failed to release listener engine");
    }
    if let Err(e) = source.close() {
        tracing::warn!(error = %e, "failed to close listener capture");
    }
}

impl KeywordSpotter for BackgroundSpotter {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn try_process(&mut self, _frame: &[i16]) -> Result<Option<usize>> {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            return Err(Error::WakeWord("wake listener stopped".to_string()));
        }

        let latest = self
            .detections
            .try_iter()
            .filter(|d| d.at.elapsed() <= DETECTION_TTL)
            .last();
        Ok(latest.map(|d| d.keyword))
    }

    fn release(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::WakeWord("wake listener panicked".to_string()))?;
            tracing::debug!("background wake listener stopped");
        }
        Ok(())
    }
}

impl Drop for BackgroundSpotter {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "error stopping wake listener");
        }
    }
}

#[cfg(feature = "porcupine")]
pub use self::porcupine_engine::PorcupineSpotter;

#[cfg(feature = "porcupine")]
mod porcupine_engine {
    use std::path::Path;

    use porcupine::{Porcupine, PorcupineBuilder};
    use secrecy::{ExposeSecret, SecretString};

    use super::KeywordSpotter;
    use crate::{Error, Result};

    /// Picovoice Porcupine wake word engine
    pub struct PorcupineSpotter {
        engine: Porcupine,
    }

    impl PorcupineSpotter {
        /// Load a keyword file
        ///
        /// # Errors
        ///
        /// Returns [`Error::ResourceInit`] if the engine rejects the key or files
        pub fn new(
            access_key: &SecretString,
            keyword_path: &Path,
            model_path: Option<&Path>,
            sensitivity: f32,
        ) -> Result<Self> {
            let mut builder = PorcupineBuilder::new_with_keyword_paths(
                access_key.expose_secret(),
                &[keyword_path.to_path_buf()],
            );
            builder.sensitivities(&[sensitivity]);
            if let Some(model) = model_path {
                builder.model_path(model);
            }
            let engine = builder
                .init()
                .map_err(|e| Error::ResourceInit(format!("porcupine: {e}")))?;

            tracing::debug!(
                keyword = %keyword_path.display(),
                sensitivity,
                frame_length = engine.frame_length(),
                "porcupine initialized"
            );

            Ok(Self { engine })
        }
    }

    impl KeywordSpotter for PorcupineSpotter {
        fn frame_length(&self) -> usize {
            self.engine.frame_length() as usize
        }

        fn try_process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
            let index = self
                .engine
                .process(frame)
                .map_err(|e| Error::WakeWord(e.to_string()))?;
            Ok(usize::try_from(index).ok())
        }
    }
}

#[cfg(feature = "vosk")]
pub use self::vosk_engine::VoskSpotter;

#[cfg(feature = "vosk")]
mod vosk_engine {
    use vosk::{CompleteResult, DecodingState, Model, Recognizer};

    use super::KeywordSpotter;
    use crate::voice::capture::SAMPLE_RATE;
    use crate::{Error, Result};

    /// Wake word spotting with a grammar-restricted Vosk recognizer
    pub struct VoskSpotter {
        recognizer: Recognizer,
        wake_word: String,
        frame_length: usize,
    }

    impl VoskSpotter {
        /// Restrict `model` to the wake word plus an unknown-word filler
        ///
        /// # Errors
        ///
        /// Returns [`Error::ResourceInit`] if the recognizer cannot be created
        pub fn new(model: &Model, wake_word: &str, frame_length: usize) -> Result<Self> {
            let grammar = [wake_word, "[unk]"];
            #[allow(clippy::cast_precision_loss)]
            let mut recognizer = Recognizer::new_with_grammar(model, SAMPLE_RATE as f32, &grammar)
                .ok_or_else(|| Error::ResourceInit("vosk wake recognizer".to_string()))?;
            recognizer.set_partial_words(false);

            Ok(Self {
                recognizer,
                wake_word: wake_word.to_string(),
                frame_length,
            })
        }
    }

    impl KeywordSpotter for VoskSpotter {
        fn frame_length(&self) -> usize {
            self.frame_length
        }

        fn try_process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
            match self.recognizer.accept_waveform(frame) {
                DecodingState::Failed => Err(Error::WakeWord("vosk decoding failed".to_string())),
                DecodingState::Finalized => match self.recognizer.final_result() {
                    CompleteResult::Single(result) if result.text.trim() == self.wake_word => {
                        Ok(Some(0))
                    }
                    _ => Ok(None),
                },
                DecodingState::Running => Ok(None),
            }
        }
    }
}
