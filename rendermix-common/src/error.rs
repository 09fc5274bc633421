//! Common error types for rendermix

use thiserror::Error;

/// Common result type for rendermix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the rendermix crates
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed TOML configuration file
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio format outside the supported range
    #[error("Invalid audio parameters: {0}")]
    InvalidParameters(String),
}
