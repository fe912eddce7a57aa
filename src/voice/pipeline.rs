//! Wake-word → command pipeline
//!
//! [`PhaseMachine`] holds the two-phase logic: frames go to the wake word
//! spotter in HOTWORD and to the command recognizer in COMMAND. [`Pipeline`]
//! owns the single worker thread that reads frames, drives the machine and
//! releases every resource when it exits.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use super::capture::{AudioSource, FrameError};
use super::engines::EngineFactory;
use super::recognizer::CommandRecognizer;
use super::wake_word::KeywordSpotter;
use crate::commands::{CommandDispatcher, MediaAction};
use crate::{Error, Result};

/// How long COMMAND waits for a finalized phrase
pub const COMMAND_TIMEOUT: Duration = Duration::from_millis(2500);

/// Back-off after the capture stream reports it has closed
const CLOSED_BACKOFF: Duration = Duration::from_millis(50);

/// Pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Listening for the wake word
    Hotword,
    /// Listening for a command phrase
    Command,
    /// Stop observed, loop exited
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hotword => write!(f, "hotword"),
            Self::Command => write!(f, "command"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of feeding one frame to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// No phase change
    Stay,
    /// Wake word detected, now in COMMAND
    Woke { keyword: usize },
    /// Phrase dispatched, back in HOTWORD
    Dispatched { phrase: String, action: MediaAction },
    /// Phrase not in the grammar, back in HOTWORD
    Rejected { phrase: String },
    /// No phrase within [`COMMAND_TIMEOUT`], back in HOTWORD
    TimedOut,
    /// Recognizer failed on a frame, back in HOTWORD
    RecognizerFailed { error: String },
}

/// The HOTWORD/COMMAND state machine
///
/// Time is passed in explicitly so the timeout can be driven by tests.
pub struct PhaseMachine {
    state: PipelineState,
    command_started: Option<Instant>,
    dispatcher: Arc<CommandDispatcher>,
}

impl PhaseMachine {
    #[must_use]
    pub const fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            state: PipelineState::Hotword,
            command_started: None,
            dispatcher,
        }
    }

    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// When the current COMMAND phase began
    #[must_use]
    pub const fn command_started(&self) -> Option<Instant> {
        self.command_started
    }

    /// Process one frame read at `now`
    pub fn step(
        &mut self,
        frame: &[i16],
        now: Instant,
        spotter: &mut dyn KeywordSpotter,
        recognizer: &mut dyn CommandRecognizer,
    ) -> Transition {
        match self.state {
            PipelineState::Hotword => {
                // The wake engine only accepts whole frames
                if frame.len() != spotter.frame_length() {
                    tracing::trace!(samples = frame.len(), "short frame skipped");
                    return Transition::Stay;
                }
                match spotter.process(frame) {
                    Some(keyword) => {
                        self.state = PipelineState::Command;
                        self.command_started = Some(now);
                        recognizer.reset();
                        tracing::info!(keyword, "wake word detected, listening for command");
                        Transition::Woke { keyword }
                    }
                    None => Transition::Stay,
                }
            }
            PipelineState::Command => {
                let started = *self.command_started.get_or_insert(now);
                match recognizer.accept_frame(frame) {
                    Ok(Some(phrase)) => {
                        self.enter_hotword();
                        match self.dispatcher.dispatch(&phrase) {
                            Ok(action) => Transition::Dispatched { phrase, action },
                            Err(_) => Transition::Rejected { phrase },
                        }
                    }
                    Ok(None) if now.saturating_duration_since(started) > COMMAND_TIMEOUT => {
                        tracing::debug!("no command within timeout");
                        self.enter_hotword();
                        Transition::TimedOut
                    }
                    Ok(None) => Transition::Stay,
                    Err(e) => {
                        tracing::warn!(error = %e, "command recognition failed");
                        self.enter_hotword();
                        Transition::RecognizerFailed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            PipelineState::Stopped => Transition::Stay,
        }
    }

    /// Enter the terminal state
    pub fn stop(&mut self) {
        self.state = PipelineState::Stopped;
        self.command_started = None;
    }

    fn enter_hotword(&mut self) {
        self.state = PipelineState::Hotword;
        self.command_started = None;
    }
}

/// Engines and capture owned by one pipeline run
///
/// Acquired in order: spotter, recognizer, capture (device then
/// enhancements). Released in reverse; each handle is taken before release
/// so nothing is released twice.
pub struct PipelineResources {
    spotter: Option<Box<dyn KeywordSpotter>>,
    recognizer: Option<Box<dyn CommandRecognizer>>,
    source: Option<Box<dyn AudioSource>>,
}

impl PipelineResources {
    /// Acquire everything a run needs
    ///
    /// On failure, whatever was already acquired is released before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceInit`] if any resource cannot be acquired
    pub fn acquire(factory: &dyn EngineFactory) -> Result<Self> {
        let mut resources = Self {
            spotter: None,
            recognizer: None,
            source: None,
        };

        resources.spotter = Some(factory.spotter()?);
        resources.recognizer = Some(factory.recognizer()?);

        let mut source = factory.source()?;
        source.open()?;
        resources.source = Some(source);

        Ok(resources)
    }

    /// Release every held resource; later calls are no-ops
    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                tracing::warn!(error = %e, "failed to close audio source");
            }
        }
        if let Some(mut recognizer) = self.recognizer.take() {
            if let Err(e) = recognizer.release() {
                tracing::warn!(error = %e, "failed to release command recognizer");
            }
        }
        if let Some(mut spotter) = self.spotter.take() {
            if let Err(e) = spotter.release() {
                tracing::warn!(error = %e, "failed to release wake word engine");
            }
        }
    }
}

impl Drop for PipelineResources {
    fn drop(&mut self) {
        self.release();
    }
}

/// Notifications for the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Resources acquired, loop running
    Started,
    /// The machine changed phase
    PhaseChanged(PipelineState),
    /// A phrase was turned into a media action
    Dispatched { phrase: String, action: MediaAction },
    /// Initialization failed or the worker panicked; no worker is running
    Failed(String),
    /// Loop exited and resources were released
    Stopped,
}

/// Owns the capture/processing worker
pub struct Pipeline {
    factory: Arc<dyn EngineFactory>,
    dispatcher: Arc<CommandDispatcher>,
    events: Option<UnboundedSender<PipelineEvent>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            factory,
            dispatcher,
            events: None,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Send [`PipelineEvent`]s to the host
    #[must_use]
    pub fn with_events(mut self, events: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Whether a worker is currently running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the worker
    ///
    /// Returns `false` without doing anything if a worker is already running.
    /// Initialization happens on the worker; its failure is reported as a
    /// [`PipelineEvent::Failed`].
    ///
    /// # Errors
    ///
    /// Returns error if the worker thread cannot be spawned
    pub fn start(&self) -> Result<bool> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("pipeline already running");
            return Ok(false);
        }

        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }
        self.stop.store(false, Ordering::SeqCst);

        let ctx = WorkerContext {
            factory: Arc::clone(&self.factory),
            dispatcher: Arc::clone(&self.dispatcher),
            events: self.events.clone(),
            running: Arc::clone(&self.running),
            stop: Arc::clone(&self.stop),
        };

        let handle = std::thread::Builder::new()
            .name("spot-pipeline".to_string())
            .spawn(move || ctx.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                Error::ResourceInit(format!("cannot start pipeline worker: {e}"))
            })?;

        *worker = Some(handle);
        tracing::info!("pipeline started");
        Ok(true)
    }

    /// Signal the worker to stop and wait for it to release its resources
    ///
    /// Safe to call any number of times.
    pub fn stop(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        self.stop.store(true, Ordering::SeqCst);

        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::debug!("joined panicked pipeline worker");
            }
            tracing::info!("pipeline stopped");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns
struct WorkerContext {
    factory: Arc<dyn EngineFactory>,
    dispatcher: Arc<CommandDispatcher>,
    events: Option<UnboundedSender<PipelineEvent>>,
    running: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    fn run(self) {
        let _running = RunningGuard {
            running: Arc::clone(&self.running),
            events: self.events.clone(),
        };

        match PipelineResources::acquire(self.factory.as_ref()) {
            Ok(mut resources) => {
                self.emit(PipelineEvent::Started);
                self.run_loop(&mut resources);
                resources.release();
                self.emit(PipelineEvent::Stopped);
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline initialization failed");
                self.emit(PipelineEvent::Failed(e.to_string()));
            }
        }
    }

    fn run_loop(&self, resources: &mut PipelineResources) {
        let (Some(spotter), Some(recognizer), Some(source)) = (
            resources.spotter.as_deref_mut(),
            resources.recognizer.as_deref_mut(),
            resources.source.as_deref_mut(),
        ) else {
            return;
        };

        let mut frame = vec![0i16; spotter.frame_length()];
        let mut machine = PhaseMachine::new(Arc::clone(&self.dispatcher));
        tracing::debug!(frame_length = frame.len(), "listening for wake word");

        while !self.stop.load(Ordering::SeqCst) {
            let samples = match source.read_frame(&mut frame) {
                Ok(0) => continue,
                Ok(n) => n,
                Err(FrameError::Closed) => {
                    tracing::debug!("audio stream closed, retrying");
                    std::thread::sleep(CLOSED_BACKOFF);
                    continue;
                }
                Err(e) => {
                    tracing::trace!(error = %e, "frame skipped");
                    continue;
                }
            };

            let before = machine.state();
            let transition = machine.step(&frame[..samples], Instant::now(), spotter, recognizer);
            if let Transition::Dispatched { phrase, action } = transition {
                self.emit(PipelineEvent::Dispatched { phrase, action });
            }
            if machine.state() != before {
                tracing::debug!(from = %before, to = %machine.state(), "phase changed");
                self.emit(PipelineEvent::PhaseChanged(machine.state()));
            }
        }

        machine.stop();
        self.emit(PipelineEvent::PhaseChanged(machine.state()));
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

/// Clears the running flag when the worker exits, including by panic
struct RunningGuard {
    running: Arc<AtomicBool>,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if std::thread::panicking() {
            tracing::error!("pipeline worker panicked");
            if let Some(events) = &self.events {
                let _ = events.send(PipelineEvent::Failed("pipeline worker panicked".to_string()));
            }
        }
    }
}
