// Concatenation of WAV files into one output.
//
// Every input header is read before any output is created. Each clip is
// compared with the first in a fixed order (channel count, sample width,
// sample rate, sample format) and the first disagreement aborts with
// `FormatMismatch` naming that clip and field. Nothing is resampled or
// converted here; `uniform.rs` does that upstream.
//
// Samples are streamed from each input straight into the writer, so the
// whole song never sits in memory. If anything fails after the output has
// been created, the partial file is removed.

use crate::error::{AudioError, FormatField};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Concatenate `clips` in order into `output`.
pub fn concatenate(output: &Path, clips: &[PathBuf]) -> Result<(), AudioError> {
    let Some(first) = clips.first() else {
        return Err(AudioError::NoClips);
    };
    let expected = read_spec(first)?;
    for clip in &clips[1..] {
        check_format(clip, &expected, &read_spec(clip)?)?;
    }

    let result = write_all(output, expected, clips);
    if result.is_err() {
        // Best effort; the write error is the one worth reporting.
        let _ = std::fs::remove_file(output);
    }
    result
}

fn read_spec(path: &Path) -> Result<WavSpec, AudioError> {
    WavReader::open(path)
        .map(|reader| reader.spec())
        .map_err(|e| AudioError::wav(path, e))
}

fn check_format(clip: &Path, expected: &WavSpec, found: &WavSpec) -> Result<(), AudioError> {
    let mismatch = |field, expected: String, found: String| AudioError::FormatMismatch {
        clip: clip.to_path_buf(),
        field,
        expected,
        found,
    };
    if found.channels != expected.channels {
        return Err(mismatch(
            FormatField::Channels,
            expected.channels.to_string(),
            found.channels.to_string(),
        ));
    }
    if found.bits_per_sample != expected.bits_per_sample {
        return Err(mismatch(
            FormatField::SampleWidth,
            format!("{} bits", expected.bits_per_sample),
            format!("{} bits", found.bits_per_sample),
        ));
    }
    if found.sample_rate != expected.sample_rate {
        return Err(mismatch(
            FormatField::SampleRate,
            format!("{} Hz", expected.sample_rate),
            format!("{} Hz", found.sample_rate),
        ));
    }
    if found.sample_format != expected.sample_format {
        return Err(mismatch(
            FormatField::SampleFormat,
            format!("{:?}", expected.sample_format),
            format!("{:?}", found.sample_format),
        ));
    }
    Ok(())
}

fn write_all(output: &Path, spec: WavSpec, clips: &[PathBuf]) -> Result<(), AudioError> {
    let mut writer = WavWriter::create(output, spec).map_err(|e| AudioError::wav(output, e))?;
    for clip in clips {
        let mut reader = WavReader::open(clip).map_err(|e| AudioError::wav(clip, e))?;
        let mut count = 0usize;
        match spec.sample_format {
            SampleFormat::Int => {
                for sample in reader.samples::<i32>() {
                    let sample = sample.map_err(|e| AudioError::wav(clip, e))?;
                    writer
                        .write_sample(sample)
                        .map_err(|e| AudioError::wav(output, e))?;
                    count += 1;
                }
            }
            SampleFormat::Float => {
                for sample in reader.samples::<f32>() {
                    let sample = sample.map_err(|e| AudioError::wav(clip, e))?;
                    writer
                        .write_sample(sample)
                        .map_err(|e| AudioError::wav(output, e))?;
                    count += 1;
                }
            }
        }
        debug!(clip = %clip.display(), samples = count, "appended clip");
    }
    writer.finalize().map_err(|e| AudioError::wav(output, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{AudioClip, ClipFormat};

    fn write_clip(dir: &Path, name: &str, format: ClipFormat, samples: Vec<f32>) -> PathBuf {
        let path = dir.join(name);
        AudioClip::new(name, format, samples).write_wav(&path).unwrap();
        path
    }

    #[test]
    fn test_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let format = ClipFormat::pcm16(1, 8000);
        let a = write_clip(dir.path(), "a.wav", format, vec![0.5; 100]);
        let b = write_clip(dir.path(), "b.wav", format, vec![-0.5; 50]);
        let out = dir.path().join("song.wav");

        concatenate(&out, &[a, b]).unwrap();

        let song = AudioClip::read_wav(&out).unwrap();
        assert_eq!(song.format, format);
        assert_eq!(song.frames(), 150);
        assert!(song.samples[..100].iter().all(|&s| s > 0.4));
        assert!(song.samples[100..].iter().all(|&s| s < -0.4));
    }

    #[test]
    fn test_rate_mismatch_names_clip_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_clip(dir.path(), "clipA.wav", ClipFormat::pcm16(2, 44100), vec![0.0; 20]);
        let b = write_clip(dir.path(), "clipB.wav", ClipFormat::pcm16(2, 22050), vec![0.0; 20]);
        let out = dir.path().join("song.wav");

        let err = concatenate(&out, &[a, b.clone()]).unwrap_err();
        match err {
            AudioError::FormatMismatch { clip, field, .. } => {
                assert_eq!(clip, b);
                assert_eq!(field, FormatField::SampleRate);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn test_channels_checked_before_rate() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_clip(dir.path(), "a.wav", ClipFormat::pcm16(2, 44100), vec![0.0; 4]);
        let b = write_clip(dir.path(), "b.wav", ClipFormat::pcm16(1, 22050), vec![0.0; 4]);
        let err = concatenate(&dir.path().join("o.wav"), &[a, b]).unwrap_err();
        assert!(matches!(
            err,
            AudioError::FormatMismatch {
                field: FormatField::Channels,
                ..
            }
        ));
    }

    #[test]
    fn test_width_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let wide = ClipFormat {
            bits_per_sample: 24,
            ..ClipFormat::pcm16(1, 8000)
        };
        let a = write_clip(dir.path(), "a.wav", ClipFormat::pcm16(1, 8000), vec![0.0; 4]);
        let b = write_clip(dir.path(), "b.wav", wide, vec![0.0; 4]);
        let err = concatenate(&dir.path().join("o.wav"), &[a, b]).unwrap_err();
        assert!(matches!(
            err,
            AudioError::FormatMismatch {
                field: FormatField::SampleWidth,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            concatenate(&dir.path().join("o.wav"), &[]),
            Err(AudioError::NoClips)
        ));
    }

    #[test]
    fn test_missing_clip_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_clip(dir.path(), "a.wav", ClipFormat::pcm16(1, 8000), vec![0.0; 4]);
        let out = dir.path().join("o.wav");
        let err = concatenate(&out, &[a, dir.path().join("gone.wav")]).unwrap_err();
        assert!(matches!(err, AudioError::Wav { .. }));
        assert!(!out.exists());
    }
}
