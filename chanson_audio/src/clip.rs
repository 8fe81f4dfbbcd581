// In-memory audio clips and WAV file I/O.
//
// An `AudioClip` holds interleaved `f32` samples in [-1, 1] plus the format
// it was read with (channel count, sample rate, bit depth, int or float).
// Keeping the original format lets a clip be written back in the same
// shape it arrived in, which matters for the concatenation guard.
//
// Pipeline stages never mutate a clip on disk: each stage reads one file
// and writes a new one under a different name.
//
// Uses the `hound` crate for WAV reading and writing.

use crate::error::AudioError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Sample encoding of a WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Int,
    Float,
}

/// Everything about a clip's layout except its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub sample_kind: SampleKind,
}

impl ClipFormat {
    /// 16-bit integer PCM, the format the concatenated output uses.
    pub fn pcm16(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_kind: SampleKind::Int,
        }
    }

    pub(crate) fn from_spec(spec: WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_kind: match spec.sample_format {
                SampleFormat::Int => SampleKind::Int,
                SampleFormat::Float => SampleKind::Float,
            },
        }
    }

    pub(crate) fn to_spec(self) -> WavSpec {
        WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.sample_kind {
                SampleKind::Int => SampleFormat::Int,
                SampleKind::Float => SampleFormat::Float,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Label used in logs and errors; usually the file it was read from.
    pub name: String,
    pub format: ClipFormat,
    /// Interleaved samples, `frames * channels` long.
    pub samples: Vec<f32>,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, format: ClipFormat, samples: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            format,
            samples,
        }
    }

    /// A clip of `frames` frames of digital silence.
    pub fn silent(name: impl Into<String>, format: ClipFormat, frames: usize) -> Self {
        let samples = vec![0.0; frames * format.channels.max(1) as usize];
        Self::new(name, format, samples)
    }

    /// Build a clip from per-channel sample vectors of equal length.
    pub fn from_channels(name: impl Into<String>, format: ClipFormat, channels: &[Vec<f32>]) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        let mut samples = Vec::with_capacity(frames * channels.len());
        for frame in 0..frames {
            for channel in channels {
                samples.push(channel[frame]);
            }
        }
        Self::new(name, format, samples)
    }

    pub fn channel_count(&self) -> usize {
        self.format.channels.max(1) as usize
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channel_count()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.format.sample_rate as f64
    }

    /// De-interleave one channel.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        self.samples
            .iter()
            .skip(index)
            .step_by(self.channel_count())
            .copied()
            .collect()
    }

    /// All channels, de-interleaved.
    pub fn channels(&self) -> Vec<Vec<f32>> {
        (0..self.channel_count()).map(|c| self.channel(c)).collect()
    }

    /// Frames `[start, end)` as a new clip.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let ch = self.channel_count();
        let end = end.min(self.frames());
        let start = start.min(end);
        Self::new(
            self.name.clone(),
            self.format,
            self.samples[start * ch..end * ch].to_vec(),
        )
    }

    pub fn read_wav(path: &Path) -> Result<Self, AudioError> {
        let mut reader = WavReader::open(path).map_err(|e| AudioError::wav(path, e))?;
        let format = ClipFormat::from_spec(reader.spec());
        let samples = match format.sample_kind {
            SampleKind::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AudioError::wav(path, e))?,
            SampleKind::Int => {
                let scale = int_full_scale(format.bits_per_sample);
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| AudioError::wav(path, e))?
            }
        };
        Ok(Self::new(path.display().to_string(), format, samples))
    }

    pub fn write_wav(&self, path: &Path) -> Result<(), AudioError> {
        let mut writer =
            WavWriter::create(path, self.format.to_spec()).map_err(|e| AudioError::wav(path, e))?;
        match self.format.sample_kind {
            SampleKind::Float => {
                for &sample in &self.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| AudioError::wav(path, e))?;
                }
            }
            SampleKind::Int => {
                let scale = int_full_scale(self.format.bits_per_sample);
                let max = scale - 1.0;
                for &sample in &self.samples {
                    let value = (sample * scale).round().clamp(-scale, max) as i32;
                    writer
                        .write_sample(value)
                        .map_err(|e| AudioError::wav(path, e))?;
                }
            }
        }
        writer.finalize().map_err(|e| AudioError::wav(path, e))?;
        Ok(())
    }
}

/// Magnitude of the most negative integer sample at `bits` depth.
fn int_full_scale(bits: u16) -> f32 {
    (1u64 << (bits.clamp(1, 32) - 1)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_and_frames() {
        let clip = AudioClip::silent("s", ClipFormat::pcm16(2, 8000), 16000);
        assert_eq!(clip.frames(), 16000);
        assert_eq!(clip.samples.len(), 32000);
        assert!((clip.duration_secs() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_channels_roundtrip_through_interleaving() {
        let left = vec![0.1, 0.2, 0.3];
        let right = vec![-0.1, -0.2, -0.3];
        let clip = AudioClip::from_channels(
            "lr",
            ClipFormat::pcm16(2, 100),
            &[left.clone(), right.clone()],
        );
        assert_eq!(clip.samples, vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);
        assert_eq!(clip.channel(0), left);
        assert_eq!(clip.channel(1), right);
    }

    #[test]
    fn test_slice_frames_clamps() {
        let clip = AudioClip::new("m", ClipFormat::pcm16(1, 10), vec![0.0, 0.1, 0.2, 0.3]);
        assert_eq!(clip.slice_frames(1, 3).samples, vec![0.1, 0.2]);
        assert_eq!(clip.slice_frames(3, 99).samples, vec![0.3]);
        assert!(clip.slice_frames(5, 2).samples.is_empty());
    }

    #[test]
    fn test_pcm16_file_preserves_format_and_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let clip = AudioClip::new(
            "tone",
            ClipFormat::pcm16(1, 22050),
            vec![0.0, 0.5, -0.5, 1.0, -1.0],
        );
        clip.write_wav(&path).unwrap();

        let back = AudioClip::read_wav(&path).unwrap();
        assert_eq!(back.format, clip.format);
        assert_eq!(back.frames(), 5);
        for (a, b) in back.samples.iter().zip(&clip.samples) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_float_file_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let format = ClipFormat {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_kind: SampleKind::Float,
        };
        let clip = AudioClip::new("f", format, vec![0.25, -0.75, 0.125, 0.0]);
        clip.write_wav(&path).unwrap();
        let back = AudioClip::read_wav(&path).unwrap();
        assert_eq!(back.format, format);
        assert_eq!(back.samples, clip.samples);
    }

    #[test]
    fn test_missing_file_is_wav_error() {
        let err = AudioClip::read_wav(Path::new("/nonexistent/clip.wav")).unwrap_err();
        assert!(matches!(err, AudioError::Wav { .. }));
    }
}
