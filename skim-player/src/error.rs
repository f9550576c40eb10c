//! Error types for skim-player
//!
//! Module-specific error types using thiserror for clear error propagation.
//! Range/logic errors (`OutOfScope`, `InvalidRange`) are typed so callers can
//! distinguish "wait for more analysis" from genuine failures.

use thiserror::Error;

/// Main error type for the skim-player engine
#[derive(Error, Debug)]
pub enum Error {
    /// Virtual timepoint beyond the analyzed portion of the timeline.
    ///
    /// The caller decides whether to wait for more analysis or report it.
    #[error("virtual timepoint {requested:.3}s is out of scope ({available:.3}s mappable)")]
    OutOfScope { requested: f64, available: f64 },

    /// Virtual range whose end precedes its begin
    #[error("invalid virtual range: end {end:.3}s precedes begin {begin:.3}s")]
    InvalidRange { begin: f64, end: f64 },

    /// Invalid timeline section construction arguments
    #[error("invalid timeline section: {0}")]
    InvalidSection(String),

    /// Frame format not convertible to the configured target format
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Configuration errors surfaced from skim-common
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<skim_common::Error> for Error {
    fn from(err: skim_common::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Convenience Result type using the skim-player Error
pub type Result<T> = std::result::Result<T, Error>;
