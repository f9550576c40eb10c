//! Audio resynthesis primitives
//!
//! Stateless numeric pieces of the decode pipeline: duration-drift
//! compensation (a bounded resample that shifts a chunk's playback duration)
//! and logistic crossfade smoothing at cut boundaries.

use crate::audio::resample::resample_chunk;
use crate::error::Result;

/// Transition length at cut boundaries: 8 samples at 16 kHz, scaled
/// proportionally to the actual sample rate.
pub const TRANSITION_DURATION: f64 = 8.0 / 16_000.0;

/// A single compensation pass may change a chunk's duration by at most this
/// fraction of the chunk's own duration.
pub const COMPENSATION_MAX_DURATION_CHANGE: f64 = 0.5;

/// Half-width of the logistic crossfade curve, in standard widths
const SIGMOID_SPAN: f64 = 3.0;

/// Number of crossfade steps for a given sample rate.
pub fn transition_steps(sample_rate: u32) -> usize {
    (TRANSITION_DURATION * sample_rate as f64).ceil() as usize
}

/// Shift a chunk's playback duration by `compensation_time` seconds
/// (positive shortens), correcting drift accumulated from non-integer-ratio
/// cuts.
///
/// The change is clamped to [`COMPENSATION_MAX_DURATION_CHANGE`] of the
/// chunk's own duration so a large single correction cannot cause runaway
/// pitch distortion. Returns the input unchanged when `compensation_time`
/// is zero.
pub fn compensated(
    audio: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    compensation_time: f64,
) -> Result<Vec<f32>> {
    if compensation_time == 0.0 || audio.is_empty() {
        return Ok(audio);
    }

    let frames = audio.len() / channels.max(1) as usize;
    let duration = frames as f64 / sample_rate as f64;
    let max_change = duration * COMPENSATION_MAX_DURATION_CHANGE;
    let change = compensation_time.clamp(-max_change, max_change);

    // Effective rate at which the chunk's sample count spans the corrected
    // duration; resampling from it back to the working rate applies the
    // shift.
    let effective_rate = (frames as f64 / (duration - change)).round();
    resample_chunk(&audio, channels, effective_rate, sample_rate as f64)
}

/// Blend the head of a new chunk with the final frame of the previous one.
///
/// The first `min(steps, frames)` frames are crossfaded with a logistic
/// weight curve spanning ±[`SIGMOID_SPAN`] standard widths, removing the
/// click a hard cut boundary would produce. `last_frame` holds one value per
/// channel.
pub fn smooth_out_transition(last_frame: &[f32], audio: &mut [f32], channels: u16, steps: usize) {
    let ch = channels.max(1) as usize;
    debug_assert_eq!(last_frame.len(), ch);

    let frames = audio.len() / ch;
    let steps = steps.min(frames);

    for k in 0..steps {
        let x = if steps == 1 {
            -SIGMOID_SPAN
        } else {
            -SIGMOID_SPAN + 2.0 * SIGMOID_SPAN * k as f64 / (steps - 1) as f64
        };
        let weight = (1.0 / (1.0 + (-x).exp())) as f32;
        for c in 0..ch {
            let idx = k * ch + c;
            audio[idx] = weight * audio[idx] + (1.0 - weight) * last_frame[c];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_steps_scaling() {
        assert_eq!(transition_steps(16_000), 8);
        assert_eq!(transition_steps(44_100), 23);
        assert_eq!(transition_steps(48_000), 24);
    }

    #[test]
    fn test_compensated_zero_is_identity() {
        let audio = vec![0.1, 0.2, 0.3, 0.4];
        let out = compensated(audio.clone(), 2, 44_100, 0.0).unwrap();
        assert_eq!(out, audio);
    }

    #[test]
    fn test_compensated_shortens_duration() {
        // 10 seconds of mono audio at 16 kHz; compensating by 0.1 s must
        // yield ~9.9 s within resampling tolerance.
        let sample_rate = 16_000u32;
        let audio: Vec<f32> = (0..sample_rate as usize * 10)
            .map(|i| (i as f32 * 0.01).sin() * 0.3)
            .collect();

        let out = compensated(audio, 1, sample_rate, 0.1).unwrap();
        let duration = out.len() as f64 / sample_rate as f64;
        assert!(
            (duration - 9.9).abs() < 0.02,
            "expected ~9.9s, got {:.4}s",
            duration
        );
    }

    #[test]
    fn test_compensated_lengthens_for_negative_time() {
        let sample_rate = 16_000u32;
        let audio = vec![0.0f32; sample_rate as usize]; // 1 s mono
        let out = compensated(audio, 1, sample_rate, -0.1).unwrap();
        let duration = out.len() as f64 / sample_rate as f64;
        assert!((duration - 1.1).abs() < 0.02, "got {:.4}s", duration);
    }

    #[test]
    fn test_compensated_clamps_large_corrections() {
        // Asking for a 10 s cut out of a 1 s chunk clamps to 50%.
        let sample_rate = 16_000u32;
        let audio = vec![0.0f32; sample_rate as usize];
        let out = compensated(audio, 1, sample_rate, 10.0).unwrap();
        let duration = out.len() as f64 / sample_rate as f64;
        assert!((duration - 0.5).abs() < 0.02, "got {:.4}s", duration);
    }

    #[test]
    fn test_smoothing_pulls_head_toward_last_frame() {
        let last = [1.0f32, -1.0];
        let mut audio = vec![0.0f32; 32]; // 16 stereo frames of silence
        smooth_out_transition(&last, &mut audio, 2, 8);

        // First frame is dominated by the carried sample...
        assert!(audio[0] > 0.9);
        assert!(audio[1] < -0.9);
        // ...the final smoothing step is dominated by the new audio...
        assert!(audio[14].abs() < 0.1);
        // ...and frames past the transition are untouched.
        assert_eq!(audio[16], 0.0);
        assert_eq!(&audio[16..], &[0.0f32; 16][..]);
    }

    #[test]
    fn test_smoothing_short_chunk() {
        let last = [0.5f32];
        let mut audio = vec![0.0f32; 3];
        // steps exceeding the chunk length clamp to the chunk.
        smooth_out_transition(&last, &mut audio, 1, 100);
        assert!(audio[0] > 0.4);
        assert!(audio[2] < 0.1);
    }
}
