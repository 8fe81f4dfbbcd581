// Uniform-format conversion ahead of concatenation.
//
// The concatenator refuses clips whose channel count, sample width or
// sample rate differ, so every per-line clip is first converted to one
// shared format. Channel layout is remapped (mono fans out to every output
// channel, many-to-mono averages, anything else cycles source channels)
// and the sample rate is changed with rubato's FFT resampler, compensated
// for its output delay so the converted clip lines up with the source.
// Clips too short to fill the resampler, or a resampler that fails, fall
// back to the linear interpolation `stretch.rs` uses. The clip's duration
// is preserved.

use crate::clip::{AudioClip, ClipFormat};
use crate::stretch::resample_linear;
use rubato::{FftFixedIn, ResampleError, Resampler, ResamplerConstructionError};
use thiserror::Error;
use tracing::warn;

/// Input frames the FFT resampler consumes per chunk.
const CHUNK_FRAMES: usize = 1024;

/// Below this many frames the linear path is used.
const MIN_FFT_FRAMES: usize = 64;

#[derive(Error, Debug)]
enum RateError {
    #[error("resampler setup failed: {0}")]
    Setup(#[from] ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] ResampleError),
}

/// Convert `clip` to `target` format, keeping its duration.
pub fn to_uniform(clip: &AudioClip, target: ClipFormat) -> AudioClip {
    let source = clip.channels();
    let out_channels = target.channels.max(1) as usize;

    let remapped: Vec<Vec<f32>> = if source.len() == out_channels {
        source
    } else if out_channels == 1 {
        vec![mix_down(&source, clip.frames())]
    } else {
        (0..out_channels)
            .map(|c| source[c % source.len()].clone())
            .collect()
    };

    let source_rate = clip.format.sample_rate;
    if source_rate == target.sample_rate || source_rate == 0 {
        return AudioClip::from_channels(clip.name.clone(), target, &remapped);
    }
    let frames = clip.frames();
    let new_frames =
        (frames as f64 * target.sample_rate as f64 / source_rate as f64).round() as usize;

    let resampled = if frames < MIN_FFT_FRAMES {
        resample_all_linear(&remapped, new_frames)
    } else {
        match resample_fft(&remapped, source_rate, target.sample_rate, new_frames) {
            Ok(channels) => channels,
            Err(e) => {
                warn!(
                    clip = %clip.name,
                    from = source_rate,
                    to = target.sample_rate,
                    error = %e,
                    "falling back to linear resampling"
                );
                resample_all_linear(&remapped, new_frames)
            }
        }
    };

    AudioClip::from_channels(clip.name.clone(), target, &resampled)
}

fn resample_all_linear(channels: &[Vec<f32>], new_frames: usize) -> Vec<Vec<f32>> {
    channels
        .iter()
        .map(|channel| resample_linear(channel, new_frames))
        .collect()
}

/// Resample every channel from `from` Hz to `to` Hz, returning exactly
/// `new_frames` frames per channel with the resampler's delay removed.
fn resample_fft(
    channels: &[Vec<f32>],
    from: u32,
    to: u32,
    new_frames: usize,
) -> Result<Vec<Vec<f32>>, RateError> {
    let mut resampler =
        FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_FRAMES, 2, channels.len())?;
    let delay = resampler.output_delay();
    let needed = delay + new_frames;
    let frames = channels.first().map_or(0, Vec::len);

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(needed); channels.len()];
    let mut pos = 0;
    while output[0].len() < needed {
        let want = resampler.input_frames_next();
        let end = (pos + want).min(frames);
        let chunk = if pos >= frames {
            // Input exhausted: flush what is still buffered.
            resampler.process_partial(None::<&[&[f32]]>, None)?
        } else {
            let window: Vec<&[f32]> = channels.iter().map(|c| &c[pos..end]).collect();
            if end - pos == want {
                resampler.process(window.as_slice(), None)?
            } else {
                resampler.process_partial(Some(window.as_slice()), None)?
            }
        };
        pos += want;
        for (out, part) in output.iter_mut().zip(chunk) {
            out.extend(part);
        }
    }

    for channel in &mut output {
        channel.truncate(needed);
        channel.drain(..delay);
    }
    Ok(output)
}

fn mix_down(channels: &[Vec<f32>], frames: usize) -> Vec<f32> {
    let n = channels.len().max(1) as f32;
    (0..frames)
        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / n)
        .collect()
}
