// Error type for the music crate.
//
// Every fallible operation in this crate (syllable lexicon loading, MIDI
// parsing and writing, quantization preconditions, melody rewriting) returns
// `MusicError`. The pipeline crate maps these onto its own job-level
// taxonomy, so variants here stay close to what actually went wrong.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MusicError {
    /// A precondition on the caller's input was violated.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The source melody contains no note-on event with nonzero velocity.
    #[error("no sounding pitches found in melody {source_name}")]
    NoPitchesFound { source_name: String },

    #[error("failed to parse MIDI data: {0}")]
    Midi(#[from] midly::Error),

    #[error("failed to encode MIDI: {0}")]
    Encode(String),

    #[error("failed to parse lexicon {}: {source}", .path.display())]
    Lexicon {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MusicError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MusicError::Io {
            path: path.into(),
            source,
        }
    }
}
