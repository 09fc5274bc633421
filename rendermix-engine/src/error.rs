//! Error types for rendermix-engine
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the mixing engine
#[derive(Error, Debug)]
pub enum Error {
    /// Shared-type errors (configuration, audio parameters)
    #[error(transparent)]
    Common(#[from] rendermix_common::Error),

    /// Sample-rate converter construction or processing errors
    #[error("Resampler error: {0}")]
    Resampler(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
