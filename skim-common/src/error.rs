//! Common error types for Skim

use thiserror::Error;

/// Common result type for Skim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared across Skim crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
