// Error taxonomy for the pipeline.
//
// `PipelineError` is what a single stage returns. Errors from the music and
// audio crates are folded into it so that the kinds callers care about
// (`NoPitchesFound`, `FormatMismatch`, `EmptySourceClip`, ...) surface as
// first-class variants rather than being buried inside a wrapper; anything
// else is kept as `Music`/`Audio` for its message. `kind()` flattens the
// enum for matching.
//
// A failing job wraps its `PipelineError` in a `JobError` that records the
// line index, job identifier and the last state the job reached. The batch
// layer returns `BatchError`.
//
// `SilenceDetectionEmpty` is deliberately absent: it is an advisory, see
// `runner::Advisory`.

use crate::job::{JobId, JobStage};
use chanson_audio::{AudioError, FormatField};
use chanson_music::MusicError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Flat classification of `PipelineError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NoPitchesFound,
    DegenerateOutput,
    EmptySourceClip,
    SynthesisFailed,
    VoiceTransformFailed,
    MissingVoiceModel,
    UnexpectedResponseShape,
    FormatMismatch,
    Cancelled,
    Config,
    Io,
    Audio,
    Music,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no sounding pitches found in melody {source_name}")]
    NoPitchesFound { source_name: String },

    /// An intermediate artifact came out empty or unusable.
    #[error("degenerate output {}: {detail}", .artifact.display())]
    DegenerateOutput { artifact: PathBuf, detail: String },

    #[error("clip {name} is empty")]
    EmptySourceClip { name: String },

    #[error("voice synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("voice transform failed: {0}")]
    VoiceTransformFailed(String),

    #[error("no voice model reference given")]
    MissingVoiceModel,

    #[error("unexpected response shape from voice transform: {0}")]
    UnexpectedResponseShape(String),

    #[error("{} has {field} {found}, expected {expected}", .clip.display())]
    FormatMismatch {
        clip: PathBuf,
        field: FormatField,
        expected: String,
        found: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Audio(AudioError),

    #[error(transparent)]
    Music(MusicError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::NoPitchesFound { .. } => ErrorKind::NoPitchesFound,
            PipelineError::DegenerateOutput { .. } => ErrorKind::DegenerateOutput,
            PipelineError::EmptySourceClip { .. } => ErrorKind::EmptySourceClip,
            PipelineError::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            PipelineError::VoiceTransformFailed(_) => ErrorKind::VoiceTransformFailed,
            PipelineError::MissingVoiceModel => ErrorKind::MissingVoiceModel,
            PipelineError::UnexpectedResponseShape(_) => ErrorKind::UnexpectedResponseShape,
            PipelineError::FormatMismatch { .. } => ErrorKind::FormatMismatch,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Io { .. } => ErrorKind::Io,
            PipelineError::Audio(_) => ErrorKind::Audio,
            PipelineError::Music(_) => ErrorKind::Music,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<MusicError> for PipelineError {
    fn from(err: MusicError) -> Self {
        match err {
            MusicError::InvalidInput(msg) => PipelineError::InvalidInput(msg),
            MusicError::NoPitchesFound { source_name } => {
                PipelineError::NoPitchesFound { source_name }
            }
            other => PipelineError::Music(other),
        }
    }
}

impl From<AudioError> for PipelineError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::InvalidInput(msg) => PipelineError::InvalidInput(msg),
            AudioError::EmptySourceClip { name } => PipelineError::EmptySourceClip { name },
            AudioError::FormatMismatch {
                clip,
                field,
                expected,
                found,
            } => PipelineError::FormatMismatch {
                clip,
                field,
                expected,
                found,
            },
            other => PipelineError::Audio(other),
        }
    }
}

/// A job failure, tagged with where it happened.
#[derive(Error, Debug)]
#[error("line {line} (job {job_id}) failed after {stage}: {source}")]
pub struct JobError {
    pub line: usize,
    pub job_id: JobId,
    /// The last state the job reached before failing.
    pub stage: JobStage,
    #[source]
    pub source: PipelineError,
}

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid batch: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Job(#[from] JobError),

    /// Every job failed under the skip policy.
    #[error("all {failed} lines failed; nothing to concatenate")]
    NothingToConcatenate { failed: usize },

    /// Building the batch namespace or the final output failed.
    #[error("failed to assemble output: {0}")]
    Output(#[source] PipelineError),
}

impl BatchError {
    /// The underlying pipeline error kind, when there is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            BatchError::InvalidInput(_) => Some(ErrorKind::InvalidInput),
            BatchError::Job(err) => Some(err.kind()),
            BatchError::NothingToConcatenate { .. } => None,
            BatchError::Output(err) => Some(err.kind()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_errors_keep_their_kind() {
        let err: PipelineError = MusicError::NoPitchesFound {
            source_name: "empty.mid".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NoPitchesFound);

        let err: PipelineError = MusicError::InvalidInput("zero syllables".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_audio_format_mismatch_is_lifted() {
        let err: PipelineError = AudioError::FormatMismatch {
            clip: PathBuf::from("b.wav"),
            field: FormatField::SampleRate,
            expected: "44100 Hz".into(),
            found: "22050 Hz".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::FormatMismatch);
        assert!(err.to_string().contains("b.wav"));
        assert!(err.to_string().contains("sample rate"));
    }

    #[test]
    fn test_other_audio_errors_are_wrapped() {
        let err: PipelineError = AudioError::NoClips.into();
        assert_eq!(err.kind(), ErrorKind::Audio);
    }
}
