//! Command dispatch
//!
//! Turns a finalized phrase into a [`MediaAction`] and drives the injected
//! [`MediaController`]. Controller failures are logged and swallowed so a
//! flaky player never stops the listening loop.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::grammar::Grammar;
use crate::media::MediaController;

/// Seek distance used when `skip`/`rewind` carry no usable number
pub const DEFAULT_SEEK_SECONDS: u32 = 10;

/// Command verb after the wake word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Skip,
    Rewind,
}

impl Verb {
    /// Parse a spoken verb
    #[must_use]
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            "next" => Some(Self::Next),
            "previous" => Some(Self::Previous),
            "skip" => Some(Self::Skip),
            "rewind" => Some(Self::Rewind),
            _ => None,
        }
    }
}

/// A parsed command: verb plus optional magnitude in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEvent {
    pub verb: Verb,
    pub magnitude: Option<u32>,
}

impl CommandEvent {
    /// Parse a grammar phrase
    ///
    /// The phrase is normalized first and must then be an exact grammar member
    /// carrying the wake word.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unrecognized`] for anything outside the grammar
    pub fn parse(grammar: &Grammar, phrase: &str) -> Result<Self, DispatchError> {
        let normalized = grammar.normalize(phrase);
        if !grammar.contains(&normalized) {
            return Err(DispatchError::Unrecognized(phrase.to_string()));
        }

        let body = grammar
            .strip_wake_word(&normalized)
            .ok_or_else(|| DispatchError::Unrecognized(phrase.to_string()))?;

        let (verb_word, argument) = match body.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest.trim())),
            None => (body, None),
        };

        let verb =
            Verb::parse(verb_word).ok_or_else(|| DispatchError::Unrecognized(phrase.to_string()))?;

        let magnitude = match verb {
            Verb::Skip | Verb::Rewind => Some(resolve_magnitude(grammar, argument)),
            _ => None,
        };

        Ok(Self { verb, magnitude })
    }

    /// The media action this command maps to
    #[must_use]
    pub const fn action(&self) -> MediaAction {
        let seconds = match self.magnitude {
            Some(n) => n,
            None => DEFAULT_SEEK_SECONDS,
        };
        match self.verb {
            Verb::Play | Verb::Pause | Verb::Stop => MediaAction::PlayPause,
            Verb::Next => MediaAction::Next,
            Verb::Previous => MediaAction::Previous,
            Verb::Skip => MediaAction::SeekForward(seconds),
            Verb::Rewind => MediaAction::SeekBackward(seconds),
        }
    }
}

/// Resolve a numeric argument: literal integer, then number word, then default
fn resolve_magnitude(grammar: &Grammar, argument: Option<&str>) -> u32 {
    argument
        .and_then(|arg| {
            arg.parse::<u32>()
                .ok()
                .or_else(|| grammar.numbers().value(arg))
        })
        .unwrap_or(DEFAULT_SEEK_SECONDS)
}

/// Playback action performed for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    PlayPause,
    Next,
    Previous,
    SeekForward(u32),
    SeekBackward(u32),
}

impl fmt::Display for MediaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayPause => write!(f, "play/pause"),
            Self::Next => write!(f, "next"),
            Self::Previous => write!(f, "previous"),
            Self::SeekForward(s) => write!(f, "seek +{s}s"),
            Self::SeekBackward(s) => write!(f, "seek -{s}s"),
        }
    }
}

/// Dispatch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Phrase is not a grammar member or lacks the wake word
    #[error("unrecognized command: {0:?}")]
    Unrecognized(String),
}

/// Maps grammar phrases onto a media controller
pub struct CommandDispatcher {
    grammar: Arc<Grammar>,
    controller: Arc<dyn MediaController>,
}

impl CommandDispatcher {
    /// Create a dispatcher over a grammar and an injected controller
    #[must_use]
    pub fn new(grammar: Arc<Grammar>, controller: Arc<dyn MediaController>) -> Self {
        Self {
            grammar,
            controller,
        }
    }

    /// The grammar phrases are validated against
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Validate a phrase and perform its action
    ///
    /// Controller errors are logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unrecognized`] when the phrase is not in the
    /// grammar; the controller is not called in that case
    pub fn dispatch(&self, phrase: &str) -> Result<MediaAction, DispatchError> {
        let command = CommandEvent::parse(&self.grammar, phrase).inspect_err(|e| {
            tracing::warn!(error = %e, "ignoring phrase");
        })?;
        let action = command.action();

        tracing::info!(phrase, %action, "dispatching command");

        let outcome = match action {
            MediaAction::PlayPause => self.controller.play_pause(),
            MediaAction::Next => self.controller.next(),
            MediaAction::Previous => self.controller.previous(),
            MediaAction::SeekForward(s) => self.controller.seek(i64::from(s)),
            MediaAction::SeekBackward(s) => self.controller.seek(-i64::from(s)),
        };

        if let Err(e) = outcome {
            tracing::warn!(
                controller = self.controller.name(),
                %action,
                error = %e,
                "media controller failed"
            );
        }

        Ok(action)
    }
}
