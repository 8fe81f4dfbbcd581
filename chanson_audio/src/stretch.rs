// Duration normalization by resampling.
//
// Forces a clip to an exact duration by resampling each channel to
// `round(frames * target / current)` frames with linear interpolation, at
// the original sample rate. Pitch and tempo move together (a tape-speed
// change, not a phase vocoder); the pipeline relies on the later voice
// transform to smooth over the pitch shift.
//
// Sample positions use half-sample centers (`(i + 0.5) * scale - 0.5`),
// so the first and last output samples line up with the first and last
// input samples instead of drifting toward one end.

use crate::clip::AudioClip;
use crate::error::AudioError;

/// Resample `clip` so that it lasts `target_secs` seconds.
///
/// Fails with `EmptySourceClip` when the clip has no duration. A target of
/// zero yields an empty clip; callers treat that as degenerate output.
pub fn normalize(clip: &AudioClip, target_secs: f64) -> Result<AudioClip, AudioError> {
    let current = clip.duration_secs();
    if current <= 0.0 {
        return Err(AudioError::EmptySourceClip {
            name: clip.name.clone(),
        });
    }
    if !target_secs.is_finite() || target_secs < 0.0 {
        return Err(AudioError::InvalidInput(format!(
            "target duration must be a non-negative number of seconds, got {target_secs}"
        )));
    }

    let ratio = target_secs / current;
    let new_frames = (clip.frames() as f64 * ratio).round() as usize;
    let channels: Vec<Vec<f32>> = clip
        .channels()
        .iter()
        .map(|channel| resample_linear(channel, new_frames))
        .collect();
    Ok(AudioClip::from_channels(
        clip.name.clone(),
        clip.format,
        &channels,
    ))
}

/// Linear-interpolation resample of one channel to `new_len` samples.
pub fn resample_linear(input: &[f32], new_len: usize) -> Vec<f32> {
    if input.is_empty() || new_len == 0 {
        return vec![0.0; new_len];
    }
    if input.len() == new_len {
        return input.to_vec();
    }

    let scale = input.len() as f64 / new_len as f64;
    let last = (input.len() - 1) as f64;
    (0..new_len)
        .map(|i| {
            let pos = ((i as f64 + 0.5) * scale - 0.5).clamp(0.0, last);
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(input.len() - 1);
            let frac = (pos - lo as f64) as f32;
            input[lo] + (input[hi] - input[lo]) * frac
        })
        .collect()
}
