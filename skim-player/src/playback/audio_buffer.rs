//! Decoded-audio staging buffer
//!
//! Owns the circular sample store for one playback session. Raw decoded
//! frames are staged against a timeline mapping: converted to the session's
//! working format, sliced to the mapped source ranges, re-timed for
//! per-section playback rates, drift-corrected, and smoothed across cut
//! boundaries. Staged chunks are then written into the ring, where an
//! overflowing backlog evicts the oldest samples rather than blocking the
//! decode worker.

use crate::audio::resample::resample_chunk;
use crate::audio::synthesis::{compensated, smooth_out_transition, transition_steps};
use crate::audio::types::{AudioSpec, RawFrame};
use crate::error::{Error, Result};
use crate::playback::circular_buffer::CircularBuffer;
use crate::playback::timeline::RangeMappingResult;
use tracing::{debug, trace};

/// Accumulated duration drift beyond which a compensation resample is applied
const DRIFT_FIX_THRESHOLD: f64 = 0.05;

/// Circular buffer of decoded audio in the session's working format
/// (f32 interleaved).
pub struct AudioBuffer {
    spec: AudioSpec,

    ring: CircularBuffer<f32>,

    /// Nominal fill level in frames; the ring's real capacity carries a
    /// safety margin above this
    max_frames: usize,

    /// Final frame of the previously staged chunk, carried for boundary
    /// smoothing
    last_frame: Vec<f32>,
    have_last: bool,

    /// Force a smoothing transition on the next staged chunk (set after
    /// seek/clear)
    force_transition: bool,

    /// Source timepoint the next staged slice continues from, when the
    /// previous slice ran up to it without a cut
    expected_source: Option<f64>,

    /// Accumulated produced-minus-mapped duration (seconds); positive means
    /// the resampler has produced slightly too much audio
    drift: f64,
}

impl AudioBuffer {
    /// Create a buffer holding `max_duration` seconds of audio plus a safety
    /// margin.
    pub fn new(spec: AudioSpec, max_duration: f64, size_margin: f64) -> Result<Self> {
        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(Error::UnsupportedFormat(format!(
                "invalid target format: {} Hz, {} channels",
                spec.sample_rate, spec.channels
            )));
        }
        if !(max_duration > 0.0) || !(size_margin >= 1.0) {
            return Err(Error::Playback(format!(
                "invalid buffer sizing: duration {max_duration}, margin {size_margin}"
            )));
        }

        let max_frames = (max_duration * spec.sample_rate as f64).ceil() as usize;
        let capacity = (max_frames as f64 * size_margin).ceil() as usize;
        debug!(
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            capacity_frames = capacity,
            "creating audio buffer"
        );

        Ok(Self {
            spec,
            ring: CircularBuffer::new(capacity, spec.channels as usize),
            max_frames,
            last_frame: vec![0.0; spec.channels as usize],
            have_last: false,
            force_transition: false,
            expected_source: None,
            drift: 0.0,
        })
    }

    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Unread frames currently buffered.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Buffered duration in seconds.
    pub fn duration(&self) -> f64 {
        self.ring.len() as f64 / self.spec.sample_rate as f64
    }

    /// True once the nominal fill level is reached; the decode worker backs
    /// off while this holds.
    pub fn is_full(&self) -> bool {
        self.ring.len() >= self.max_frames
    }

    /// Discard buffered audio and reset staging continuity (after a seek the
    /// next chunk starts at a cut).
    pub fn clear(&mut self) {
        self.ring.clear();
        self.expected_source = None;
        self.drift = 0.0;
        self.force_transition = true;
    }

    /// Stage a raw decoded frame against a timeline mapping.
    ///
    /// Produces one format-converted chunk per mapped source range the frame
    /// overlaps: sliced, re-timed to the working rate (folding in the range's
    /// playback rate), drift-compensated when the accumulated error exceeds
    /// its threshold, and smoothed against the carried last frame when the
    /// slice starts at a cut. Portions of the frame falling in no mapped
    /// range are dropped.
    pub fn stage(&mut self, frame: &RawFrame, mapping: &RangeMappingResult) -> Result<Vec<Vec<f32>>> {
        let channels = self.spec.channels;
        let converted = frame.to_f32_interleaved(channels)?;
        let src_rate = frame.sample_rate as f64;
        let frame_count = converted.len() / channels as usize;
        // Continuity tolerance of half a source sample
        let continuity_eps = 0.5 / src_rate;

        let mut chunks = Vec::new();
        for range in &mapping.ranges {
            let begin = range.source_begin.max(frame.start);
            let end = range.source_end.min(frame.end());
            if end <= begin {
                continue;
            }

            let i0 = (((begin - frame.start) * src_rate).round() as usize).min(frame_count);
            let i1 = (((end - frame.start) * src_rate).round() as usize).min(frame_count);
            if i1 <= i0 {
                continue;
            }
            let slice = &converted[i0 * channels as usize..i1 * channels as usize];

            // One resampling pass folds the playback-rate modifier and the
            // normalization to the working rate together.
            let mut chunk = resample_chunk(
                slice,
                channels,
                src_rate * range.playback_rate,
                self.spec.sample_rate as f64,
            )?;

            let target_virtual = (i1 - i0) as f64 / src_rate / range.playback_rate;
            let produced =
                (chunk.len() / channels as usize) as f64 / self.spec.sample_rate as f64;
            self.drift += produced - target_virtual;
            if self.drift.abs() > DRIFT_FIX_THRESHOLD {
                let before = chunk.len() / channels as usize;
                chunk = compensated(chunk, channels, self.spec.sample_rate, self.drift)?;
                let after = chunk.len() / channels as usize;
                let removed = (before as f64 - after as f64) / self.spec.sample_rate as f64;
                self.drift -= removed;
                trace!(drift = self.drift, "applied drift compensation");
            }
            if chunk.is_empty() {
                continue;
            }

            let discontinuity = self.force_transition
                || self
                    .expected_source
                    .map(|t| (begin - t).abs() > continuity_eps)
                    .unwrap_or(false);
            if discontinuity && self.have_last {
                smooth_out_transition(
                    &self.last_frame,
                    &mut chunk,
                    channels,
                    transition_steps(self.spec.sample_rate),
                );
            }
            self.force_transition = false;

            self.last_frame
                .copy_from_slice(&chunk[chunk.len() - channels as usize..]);
            self.have_last = true;
            self.expected_source = Some(end);
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Write samples at the write cursor. An overflowing backlog evicts the
    /// oldest unread samples (bounded-memory policy, not an error). Returns
    /// the number of frames evicted.
    pub fn put(&mut self, samples: &[f32]) -> Result<usize> {
        if samples.len() % self.spec.channels as usize != 0 {
            return Err(Error::Playback(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                self.spec.channels
            )));
        }
        let evicted = self.ring.push(samples);
        if evicted > 0 {
            debug!(evicted, "audio buffer overflow: evicted oldest frames");
        }
        Ok(evicted)
    }

    /// Read up to `frames` frames at the read cursor. Never blocks; returns
    /// fewer than requested when fewer are buffered.
    pub fn read(&mut self, frames: usize) -> Vec<f32> {
        self.ring.pop(frames)
    }
}
