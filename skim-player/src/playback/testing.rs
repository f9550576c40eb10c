//! Synthetic stream readers for engine tests.

use crate::audio::reader::{ReaderFactory, StreamReader};
use crate::audio::types::{RawFrame, SampleData, SampleLayout, StreamInfo};
use crate::error::Result;
use std::path::Path;

/// Sample rate of the synthetic ramp stream
pub const RAMP_RATE: u32 = 1_000;

/// Mono reader yielding `total` ramp samples (0.0, 1.0, 2.0, ...) in 0.1 s
/// frames; sample values double as source positions, which makes cut
/// placement directly observable in test output.
pub struct RampReader {
    pub position: usize,
    pub total: usize,
}

impl StreamReader for RampReader {
    fn info(&self) -> StreamInfo {
        StreamInfo {
            sample_rate: RAMP_RATE,
            channels: 1,
            duration: Some(self.total as f64 / RAMP_RATE as f64),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.position >= self.total {
            return Ok(None);
        }
        let frames = 100.min(self.total - self.position);
        let start = self.position as f64 / RAMP_RATE as f64;
        let data = (self.position..self.position + frames)
            .map(|i| i as f32)
            .collect();
        self.position += frames;
        Ok(Some(RawFrame {
            data: SampleData::F32(data),
            layout: SampleLayout::Interleaved,
            channels: 1,
            sample_rate: RAMP_RATE,
            start,
        }))
    }
}

/// Factory producing [`RampReader`]s of one second, honoring `start_at`.
pub struct RampFactory;

impl ReaderFactory for RampFactory {
    fn open(
        &self,
        _path: &Path,
        _stream_index: usize,
        start_at: f64,
    ) -> Result<Box<dyn StreamReader>> {
        Ok(Box::new(RampReader {
            position: (start_at * RAMP_RATE as f64) as usize,
            total: RAMP_RATE as usize,
        }))
    }

    fn probe(&self, _path: &Path, _stream_index: usize) -> Result<StreamInfo> {
        Ok(RampReader {
            position: 0,
            total: RAMP_RATE as usize,
        }
        .info())
    }
}
