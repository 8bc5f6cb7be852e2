//! Error types for sonolink-engine
//!
//! Module-specific error types using thiserror. Errors that occur while
//! processing a single clip are handled where they occur (the clip degrades
//! to silence); these types carry the context upward when a whole operation
//! cannot proceed.

use thiserror::Error;

/// Main error type for the engine crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback router errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Priority queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    /// Opus encoding errors
    #[error("Encode error: {0}")]
    Encode(String),

    /// Remote transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Spectrum analyzer errors
    #[error("Analyzer error: {0}")]
    Analyzer(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared/common errors
    #[error(transparent)]
    Common(#[from] sonolink_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
