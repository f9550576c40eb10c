//! Player configuration loading
//!
//! Configuration is resolved in priority order:
//! 1. Explicit path passed on the command line
//! 2. Platform config directory (`<config dir>/skim/config.toml`)
//! 3. Compiled defaults
//!
//! The cache directory is an explicit value here rather than ambient process
//! state; components that need it receive it from this struct.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Playback engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Seconds of decoded audio kept buffered ahead of playback
    pub buffer_duration: f64,

    /// Safety margin applied to the buffer capacity (1.2 = 20% headroom)
    pub buffer_size_margin: f64,

    /// Virtual seconds mapped through the timeline per decode step
    pub chunk_duration: f64,

    /// Source-time gap (seconds) beyond which the worker reopens the reader
    /// instead of decoding through and discarding
    pub seek_threshold: f64,

    /// Audio output device name (None = system default)
    pub device: Option<String>,

    /// Directory for cached artifacts (persisted timelines etc.)
    pub cache_dir: Option<PathBuf>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffer_duration: 2.5,
            buffer_size_margin: 1.2,
            chunk_duration: 1.0,
            seek_threshold: 0.25,
            device: None,
            cache_dir: None,
        }
    }
}

impl PlayerConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist and parse; with no explicit path, a
    /// missing platform config file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let config = match resolved {
            Some(p) => {
                info!("Loading configuration from {}", p.display());
                let text = std::fs::read_to_string(&p)?;
                toml::from_str::<PlayerConfig>(&text)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                PlayerConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configured values; construction-time failure, never recovered.
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_duration > 0.0) {
            return Err(Error::Config(format!(
                "buffer_duration must be positive, got {}",
                self.buffer_duration
            )));
        }
        if !(self.buffer_size_margin >= 1.0) {
            return Err(Error::Config(format!(
                "buffer_size_margin must be at least 1.0, got {}",
                self.buffer_size_margin
            )));
        }
        if !(self.chunk_duration > 0.0) {
            return Err(Error::Config(format!(
                "chunk_duration must be positive, got {}",
                self.chunk_duration
            )));
        }
        if !(self.seek_threshold >= 0.0) {
            return Err(Error::Config(format!(
                "seek_threshold must not be negative, got {}",
                self.seek_threshold
            )));
        }
        Ok(())
    }
}

/// Default configuration file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("skim").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_duration, 2.5);
        assert_eq!(config.buffer_size_margin, 1.2);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "buffer_duration = 5.0\nchunk_duration = 0.5").unwrap();

        let config = PlayerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.buffer_duration, 5.0);
        assert_eq!(config.chunk_duration, 0.5);
        // Unspecified fields keep defaults
        assert_eq!(config.seek_threshold, 0.25);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = PlayerConfig::load(Some(Path::new("/nonexistent/skim.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PlayerConfig::default();
        config.buffer_duration = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = PlayerConfig::default();
        config.buffer_size_margin = 0.5;
        assert!(config.validate().is_err());

        let mut config = PlayerConfig::default();
        config.seek_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "buffer_duration = \"not a number\"").unwrap();
        assert!(matches!(PlayerConfig::load(Some(&path)), Err(Error::Parse(_))));
    }
}
