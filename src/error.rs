//! Error types for spot

use thiserror::Error;

/// Result type alias for spot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A device, model or engine could not be acquired at startup
    #[error("resource initialization failed: {0}")]
    ResourceInit(String),

    /// Audio capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Wake word engine error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Command recognizer error
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Media controller error
    #[error("media error: {0}")]
    Media(String),

    /// Asset materialization error
    #[error("asset error: {0}")]
    Asset(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
