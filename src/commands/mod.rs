//! Command vocabulary and dispatch
//!
//! Builds the fixed grammar the recognizer is constrained to and maps
//! recognized phrases onto playback actions.

mod dispatcher;
mod grammar;
mod numbers;

pub use dispatcher::{
    CommandDispatcher, CommandEvent, DEFAULT_SEEK_SECONDS, DispatchError, MediaAction, Verb,
};
pub use grammar::{BASE_VERBS, DEFAULT_WAKE_WORD, Grammar, NUMERIC_VERBS};
pub use numbers::{MAX_NUMBER, NumberWords};
