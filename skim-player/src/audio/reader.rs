//! Stream reader abstraction
//!
//! A reader yields a lazy, finite, non-restartable sequence of raw decoded
//! frames in source-time order. Consumers must not assume a reader is
//! seekable: to start reading elsewhere, re-invoke the factory with a new
//! start position.
//!
//! Dispatch from media format to reader implementation is an explicitly
//! registered extension-keyed mapping; no runtime code loading.

use crate::audio::types::{RawFrame, StreamInfo};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Lazy sequence of decoded frames for one stream of one media file.
pub trait StreamReader: Send {
    /// Stream properties (fixed for the reader's lifetime).
    fn info(&self) -> StreamInfo;

    /// Next frame in source-time order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Opens readers for a family of media formats.
pub trait ReaderFactory: Send + Sync {
    /// Open a reader positioned at (or shortly before) `start_at` seconds.
    fn open(&self, path: &Path, stream_index: usize, start_at: f64)
        -> Result<Box<dyn StreamReader>>;

    /// Inspect stream properties without decoding.
    fn probe(&self, path: &Path, stream_index: usize) -> Result<StreamInfo>;
}

/// Extension-keyed mapping from media format to reader factory.
#[derive(Default)]
pub struct ReaderRegistry {
    factories: HashMap<String, Arc<dyn ReaderFactory>>,
}

impl ReaderRegistry {
    /// Empty registry; formats must be registered explicitly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a file extension (case-insensitive).
    /// Re-registering an extension replaces the previous factory.
    pub fn register(&mut self, extension: &str, factory: Arc<dyn ReaderFactory>) {
        let key = extension.to_ascii_lowercase();
        if self.factories.insert(key.clone(), factory).is_some() {
            debug!(extension = %key, "reader factory replaced");
        }
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.factories.contains_key(&extension.to_ascii_lowercase())
    }

    fn factory_for(&self, path: &Path) -> Result<&Arc<dyn ReaderFactory>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!("{}: no file extension", path.display()))
            })?;
        self.factories.get(&extension).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no reader registered for .{extension}"))
        })
    }

    /// Open a reader for `path`, dispatched on the file extension.
    pub fn open(
        &self,
        path: &Path,
        stream_index: usize,
        start_at: f64,
    ) -> Result<Box<dyn StreamReader>> {
        self.factory_for(path)?.open(path, stream_index, start_at)
    }

    /// Probe stream properties, dispatched on the file extension.
    pub fn probe(&self, path: &Path, stream_index: usize) -> Result<StreamInfo> {
        self.factory_for(path)?.probe(path, stream_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::AudioSpec;

    struct DummyFactory;

    impl ReaderFactory for DummyFactory {
        fn open(
            &self,
            _path: &Path,
            _stream_index: usize,
            _start_at: f64,
        ) -> Result<Box<dyn StreamReader>> {
            Err(Error::Decode("dummy".into()))
        }

        fn probe(&self, _path: &Path, _stream_index: usize) -> Result<StreamInfo> {
            let spec = AudioSpec::new(44_100, 2);
            Ok(StreamInfo {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                duration: None,
            })
        }
    }

    #[test]
    fn test_dispatch_is_extension_keyed_and_case_insensitive() {
        let mut registry = ReaderRegistry::new();
        registry.register("WAV", Arc::new(DummyFactory));

        assert!(registry.supports("wav"));
        assert!(registry.supports("WaV"));
        assert!(!registry.supports("mp3"));

        assert!(registry.probe(Path::new("x.wav"), 0).is_ok());
        assert!(registry.probe(Path::new("x.WAV"), 0).is_ok());
    }

    #[test]
    fn test_unknown_extension_is_unsupported_format() {
        let registry = ReaderRegistry::new();
        assert!(matches!(
            registry.probe(Path::new("x.xyz"), 0),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            registry.probe(Path::new("noext"), 0),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
