//! Audio resampling using rubato
//!
//! One generic entry point converts a chunk between two effective sample
//! rates. The engine leans on it twice: normalizing decoded audio to the
//! session's working rate (folding in any per-section playback-rate change)
//! and applying duration-drift compensation.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Rates closer than this are treated as equal (no resample pass)
const RATIO_EPS: f64 = 1e-9;

/// Resample an interleaved f32 chunk from `from_rate` to `to_rate`.
///
/// Rates are effective rates and may be fractional (a playback-rate modifier
/// folds into `from_rate`). Returns the input unchanged when the rates match.
pub fn resample_chunk(input: &[f32], channels: u16, from_rate: f64, to_rate: f64) -> Result<Vec<f32>> {
    if channels == 0 || input.len() % channels as usize != 0 {
        return Err(Error::Decode(format!(
            "{} samples do not divide into {} channels",
            input.len(),
            channels
        )));
    }
    if !(from_rate > 0.0) || !(to_rate > 0.0) {
        return Err(Error::Decode(format!(
            "invalid resample rates: {from_rate} -> {to_rate}"
        )));
    }

    let ratio = to_rate / from_rate;
    if (ratio - 1.0).abs() < RATIO_EPS || input.is_empty() {
        return Ok(input.to_vec());
    }

    let planar_input = deinterleave(input, channels);
    let input_frames = planar_input[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        ratio,
        1.0, // fixed ratio, no runtime adjustment
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

    Ok(interleave(planar_output))
}

/// Convert interleaved samples to planar format.
///
/// Input:  [L, R, L, R, ...]
/// Output: [[L, L, ...], [R, R, ...]]
pub fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let num_channels = channels as usize;
    let num_frames = samples.len() / num_channels;

    let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
    for frame_idx in 0..num_frames {
        for (ch_idx, channel) in planar.iter_mut().enumerate() {
            channel.push(samples[frame_idx * num_channels + ch_idx]);
        }
    }
    planar
}

/// Convert planar samples to interleaved format.
pub fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }

    let num_channels = planar.len();
    let num_frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(num_frames * num_channels);

    for frame_idx in 0..num_frames {
        for channel in &planar {
            interleaved.push(channel[frame_idx]);
        }
    }
    interleaved
}
