// Error type for clip processing.
//
// `FormatMismatch` is the concatenation guard: it names the offending clip
// and which format parameter disagreed with the first clip. `EmptySourceClip`
// is raised by operations that cannot do anything meaningful with a
// zero-length clip (stretching by a ratio, resampling).

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A WAV format parameter that must match across concatenated clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatField {
    Channels,
    SampleWidth,
    SampleRate,
    SampleFormat,
}

impl fmt::Display for FormatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatField::Channels => "channel count",
            FormatField::SampleWidth => "sample width",
            FormatField::SampleRate => "sample rate",
            FormatField::SampleFormat => "sample format",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("clip {name} is empty")]
    EmptySourceClip { name: String },

    #[error("{} has {field} {found}, expected {expected}", .clip.display())]
    FormatMismatch {
        clip: PathBuf,
        field: FormatField,
        expected: String,
        found: String,
    },

    #[error("no clips to concatenate")]
    NoClips,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("WAV error on {}: {source}", .path.display())]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AudioError {
    pub(crate) fn wav(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        AudioError::Wav {
            path: path.into(),
            source,
        }
    }
}
