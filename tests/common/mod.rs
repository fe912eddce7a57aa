//! Shared test utilities
//!
//! Scripted engines, capture sources and media controllers that stand in for
//! real hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use spot::voice::{AudioSource, CommandRecognizer, EngineFactory, FrameError, KeywordSpotter};
use spot::{CommandDispatcher, Error, Grammar, MediaController, PipelineEvent, Result};

/// First sample of a frame the scripted spotter treats as the wake word
pub const WAKE: i16 = 1000;
/// First sample of a frame the scripted recognizer finalizes on
pub const PHRASE: i16 = 2000;
/// First sample of a frame the scripted recognizer fails on
pub const BROKEN: i16 = 3000;

/// First sample of a frame the scripted recognizer panics on
pub const CRASH: i16 = 4000;

/// Frame length used by the scripted spotter
pub const FRAME: usize = 4;

/// A full frame starting with `marker`
#[must_use]
pub fn frame(marker: i16) -> Vec<i16> {
    let mut frame = vec![0i16; FRAME];
    frame[0] = marker;
    frame
}

/// Counters shared between a test and the fakes it hands out
#[derive(Default)]
pub struct Tally {
    pub sources_built: AtomicUsize,
    pub opens: AtomicUsize,
    pub resets: AtomicUsize,
    pub released: Mutex<Vec<&'static str>>,
}

impl Tally {
    pub fn released(&self) -> Vec<&'static str> {
        self.released.lock().unwrap().clone()
    }

    fn record_release(&self, what: &'static str) {
        self.released.lock().unwrap().push(what);
    }
}

/// Replays queued frames, then times out
pub struct ScriptedSource {
    frames: VecDeque<Vec<i16>>,
    open: bool,
    fail_open: bool,
    tally: Arc<Tally>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<Vec<i16>>, tally: Arc<Tally>) -> Self {
        Self {
            frames: frames.into(),
            open: false,
            fail_open: false,
            tally,
        }
    }
}

impl AudioSource for ScriptedSource {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(Error::ResourceInit("no capture device".to_string()));
        }
        self.tally.opens.fetch_add(1, Ordering::SeqCst);
        self.open = true;
        Ok(())
    }

    fn read_frame(&mut self, frame: &mut [i16]) -> std::result::Result<usize, FrameError> {
        if !self.open {
            return Err(FrameError::NotOpen);
        }
        match self.frames.pop_front() {
            Some(next) => {
                let n = next.len().min(frame.len());
                frame[..n].copy_from_slice(&next[..n]);
                Ok(n)
            }
            None => {
                std::thread::sleep(Duration::from_millis(2));
                Err(FrameError::Timeout(Duration::from_millis(2)))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.tally.record_release("source");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Matches frames whose first sample is [`WAKE`]
pub struct ScriptedSpotter {
    pub tally: Arc<Tally>,
}

impl KeywordSpotter for ScriptedSpotter {
    fn frame_length(&self) -> usize {
        FRAME
    }

    fn try_process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        Ok((frame.first() == Some(&WAKE)).then_some(0))
    }

    fn release(&mut self) -> Result<()> {
        self.tally.record_release("spotter");
        Ok(())
    }
}

/// Finalizes `phrase` on a [`PHRASE`] frame and fails on a [`BROKEN`] frame
pub struct ScriptedRecognizer {
    pub phrase: String,
    pub tally: Arc<Tally>,
}

impl CommandRecognizer for ScriptedRecognizer {
    fn reset(&mut self) {
        self.tally.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn accept_frame(&mut self, frame: &[i16]) -> Result<Option<String>> {
        match frame.first() {
            Some(&PHRASE) => Ok(Some(self.phrase.clone())),
            Some(&BROKEN) => Err(Error::Recognizer("decoder crashed".to_string())),
            Some(&CRASH) => panic!("decoder aborted"),
            _ => Ok(None),
        }
    }

    fn release(&mut self) -> Result<()> {
        self.tally.record_release("recognizer");
        Ok(())
    }
}

/// Stage at which [`ScriptedFactory`] refuses to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Recognizer,
    Open,
}

/// Hands out scripted engines and a source replaying `frames`
pub struct ScriptedFactory {
    pub tally: Arc<Tally>,
    frames: Vec<Vec<i16>>,
    phrase: String,
    fail_at: Option<FailAt>,
}

impl ScriptedFactory {
    pub fn new(frames: Vec<Vec<i16>>, phrase: &str) -> Self {
        Self {
            tally: Arc::new(Tally::default()),
            frames,
            phrase: phrase.to_string(),
            fail_at: None,
        }
    }

    #[must_use]
    pub fn failing_at(mut self, stage: FailAt) -> Self {
        self.fail_at = Some(stage);
        self
    }
}

impl EngineFactory for ScriptedFactory {
    fn spotter(&self) -> Result<Box<dyn KeywordSpotter>> {
        Ok(Box::new(ScriptedSpotter {
            tally: Arc::clone(&self.tally),
        }))
    }

    fn recognizer(&self) -> Result<Box<dyn CommandRecognizer>> {
        if self.fail_at == Some(FailAt::Recognizer) {
            return Err(Error::ResourceInit("model missing".to_string()));
        }
        Ok(Box::new(ScriptedRecognizer {
            phrase: self.phrase.clone(),
            tally: Arc::clone(&self.tally),
        }))
    }

    fn source(&self) -> Result<Box<dyn AudioSource>> {
        self.tally.sources_built.fetch_add(1, Ordering::SeqCst);
        let mut source = ScriptedSource::new(self.frames.clone(), Arc::clone(&self.tally));
        source.fail_open = self.fail_at == Some(FailAt::Open);
        Ok(Box::new(source))
    }
}

/// Records every call it receives
#[derive(Default)]
pub struct RecordingController {
    pub calls: Mutex<Vec<String>>,
    pub failing: bool,
}

impl RecordingController {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing {
            Err(Error::Media("player went away".to_string()))
        } else {
            Ok(())
        }
    }
}

impl MediaController for RecordingController {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn play_pause(&self) -> Result<()> {
        self.record("play_pause".to_string())
    }

    fn next(&self) -> Result<()> {
        self.record("next".to_string())
    }

    fn previous(&self) -> Result<()> {
        self.record("previous".to_string())
    }

    fn seek(&self, seconds: i64) -> Result<()> {
        self.record(format!("seek {seconds}"))
    }
}

/// Dispatcher over the default "jarvis" grammar
pub fn dispatcher(controller: Arc<RecordingController>) -> Arc<CommandDispatcher> {
    Arc::new(CommandDispatcher::new(
        Arc::new(Grammar::build("jarvis")),
        controller,
    ))
}

/// Wait until `pred` matches an event, collecting everything seen on the way
pub fn wait_for(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<PipelineEvent>,
    seen: &mut Vec<PipelineEvent>,
    pred: impl Fn(&PipelineEvent) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match events.try_recv() {
            Ok(event) => {
                let hit = pred(&event);
                seen.push(event);
                if hit {
                    return true;
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(5)),
        }
    }
    false
}
