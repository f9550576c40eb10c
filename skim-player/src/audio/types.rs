//! Core audio data types
//!
//! Raw decoded frames preserve the decoder's sample dtype and channel layout;
//! conversion to the engine's working format (f32 interleaved) happens once,
//! on ingest into the audio buffer. Integer formats scale to [-1.0, 1.0],
//! layout conversion is a pure reshape, and channel reduction averages;
//! nothing else is mixed implicitly.

use crate::error::{Error, Result};

/// Target audio format of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Samples per second
    pub sample_rate: u32,

    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl AudioSpec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

/// Channel layout of raw sample data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleLayout {
    /// One contiguous run per channel: [L, L, ..., R, R, ...]
    Planar,
    /// Channel-interleaved: [L, R, L, R, ...]
    Interleaved,
}

/// Sample data in its decoded dtype
#[derive(Debug, Clone)]
pub enum SampleData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I16(Vec<i16>),
    U8(Vec<u8>),
}

impl SampleData {
    /// Total value count across all channels.
    pub fn len(&self) -> usize {
        match self {
            SampleData::F32(v) => v.len(),
            SampleData::F64(v) => v.len(),
            SampleData::I32(v) => v.len(),
            SampleData::I16(v) => v.len(),
            SampleData::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn value_f32(&self, idx: usize) -> f32 {
        match self {
            SampleData::F32(v) => v[idx],
            SampleData::F64(v) => v[idx] as f32,
            SampleData::I32(v) => v[idx] as f32 / i32::MAX as f32,
            SampleData::I16(v) => v[idx] as f32 / i16::MAX as f32,
            SampleData::U8(v) => (v[idx] as i32 - 128) as f32 / 128.0,
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            SampleData::F32(_) => "f32",
            SampleData::F64(_) => "f64",
            SampleData::I32(_) => "i32",
            SampleData::I16(_) => "i16",
            SampleData::U8(_) => "u8",
        }
    }
}

/// A raw decoded audio frame in source-time order
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Sample values in the decoded dtype
    pub data: SampleData,

    /// Channel layout of `data`
    pub layout: SampleLayout,

    /// Channel count
    pub channels: u16,

    /// Sample rate of this frame
    pub sample_rate: u32,

    /// Source timepoint of the first sample (seconds)
    pub start: f64,
}

impl RawFrame {
    /// Number of per-channel frames.
    pub fn frames(&self) -> usize {
        self.data.len() / self.channels.max(1) as usize
    }

    /// Duration in source seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Source timepoint just past the last sample.
    pub fn end(&self) -> f64 {
        self.start + self.duration()
    }

    /// Convert to interleaved f32 with the requested channel count.
    ///
    /// Dtype conversion scales integers into [-1.0, 1.0]; planar to
    /// interleaved is a reshape. Channel handling: same count passes
    /// through, mono duplicates up, and more-to-fewer averages the source
    /// channels down. Anything else is not convertible.
    pub fn to_f32_interleaved(&self, target_channels: u16) -> Result<Vec<f32>> {
        if self.channels == 0 || self.data.len() % self.channels as usize != 0 {
            return Err(Error::UnsupportedFormat(format!(
                "{} values do not divide into {} channels",
                self.data.len(),
                self.channels
            )));
        }

        let src_ch = self.channels as usize;
        let frames = self.frames();

        // dtype + layout pass: interleaved f32 at the source channel count
        let mut interleaved = Vec::with_capacity(frames * src_ch);
        for frame_idx in 0..frames {
            for ch_idx in 0..src_ch {
                let idx = match self.layout {
                    SampleLayout::Interleaved => frame_idx * src_ch + ch_idx,
                    SampleLayout::Planar => ch_idx * frames + frame_idx,
                };
                interleaved.push(self.data.value_f32(idx));
            }
        }

        let dst_ch = target_channels as usize;
        if dst_ch == src_ch {
            return Ok(interleaved);
        }
        if src_ch == 1 {
            // Mono duplicates into every target channel.
            let mut out = Vec::with_capacity(frames * dst_ch);
            for &sample in &interleaved {
                out.extend(std::iter::repeat(sample).take(dst_ch));
            }
            return Ok(out);
        }
        if dst_ch < src_ch {
            // Fewer output channels: average the source channels down, then
            // spread the mean across the target layout.
            let mut out = Vec::with_capacity(frames * dst_ch);
            for frame_idx in 0..frames {
                let begin = frame_idx * src_ch;
                let mean: f32 =
                    interleaved[begin..begin + src_ch].iter().sum::<f32>() / src_ch as f32;
                out.extend(std::iter::repeat(mean).take(dst_ch));
            }
            return Ok(out);
        }

        Err(Error::UnsupportedFormat(format!(
            "cannot convert {} channels ({}) to {} channels",
            src_ch,
            self.data.format_name(),
            dst_ch
        )))
    }
}

/// Properties of a media stream, reported by a reader before decoding
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Total stream duration in seconds, when the container reports one
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: SampleData, layout: SampleLayout, channels: u16) -> RawFrame {
        RawFrame {
            data,
            layout,
            channels,
            sample_rate: 48_000,
            start: 0.0,
        }
    }

    #[test]
    fn test_planar_to_interleaved_is_reshape() {
        let raw = frame(
            SampleData::F32(vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]),
            SampleLayout::Planar,
            2,
        );
        let out = raw.to_f32_interleaved(2).unwrap();
        assert_eq!(out, vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    }

    #[test]
    fn test_i16_scaling() {
        let raw = frame(
            SampleData::I16(vec![0, i16::MAX, -i16::MAX]),
            SampleLayout::Interleaved,
            1,
        );
        let out = raw.to_f32_interleaved(1).unwrap();
        assert_eq!(out[0], 0.0);
        assert!((out[1] - 1.0).abs() < 1e-6);
        assert!((out[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_u8_centered() {
        let raw = frame(SampleData::U8(vec![128, 255, 0]), SampleLayout::Interleaved, 1);
        let out = raw.to_f32_interleaved(1).unwrap();
        assert_eq!(out[0], 0.0);
        assert!(out[1] > 0.98);
        assert_eq!(out[2], -1.0);
    }

    #[test]
    fn test_mono_duplicates_to_stereo() {
        let raw = frame(SampleData::F32(vec![0.25, -0.5]), SampleLayout::Interleaved, 1);
        let out = raw.to_f32_interleaved(2).unwrap();
        assert_eq!(out, vec![0.25, 0.25, -0.5, -0.5]);
    }

    #[test]
    fn test_downmix_averages_channels() {
        let raw = frame(
            SampleData::F32(vec![0.2, 0.4, -0.2, -0.4]),
            SampleLayout::Interleaved,
            2,
        );
        let out = raw.to_f32_interleaved(1).unwrap();
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert!((out[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unsupported_upmix_rejected() {
        let raw = frame(
            SampleData::F32(vec![0.1, 0.2, 0.3, 0.4]),
            SampleLayout::Interleaved,
            2,
        );
        assert!(matches!(
            raw.to_f32_interleaved(4),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_frame_timing() {
        let raw = RawFrame {
            data: SampleData::F32(vec![0.0; 96_000]),
            layout: SampleLayout::Interleaved,
            channels: 2,
            sample_rate: 48_000,
            start: 1.5,
        };
        assert_eq!(raw.frames(), 48_000);
        assert!((raw.duration() - 1.0).abs() < 1e-9);
        assert!((raw.end() - 2.5).abs() < 1e-9);
    }
}
