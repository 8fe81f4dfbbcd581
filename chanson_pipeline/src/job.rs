// Job model and per-job file namespaces.
//
// A `JobSpec` is one (melody, lyric line) pair plus its per-line
// parameters. Each batch gets a fresh root directory named after a random
// token, and job `n` writes its intermediates under `line-<n>/` inside that
// root. Two jobs never share a directory, and two batches never share a
// root, so jobs can run concurrently without a lock around file naming.
//
// Intermediate file names inside a job directory are fixed by `Artifact`.
// Because they depend only on the line index, the janitor can enumerate
// everything a batch may have produced from the line count alone.

use crate::error::PipelineError;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One line's worth of work.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub melody_path: PathBuf,
    pub lyric: String,
    pub target_duration_secs: f64,
    /// Semitones passed to the voice transform.
    pub pitch_shift: i32,
    /// URL or local archive path of the voice model.
    pub voice_model: String,
}

impl JobSpec {
    /// Reject parameters no stage could work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.target_duration_secs.is_finite() || self.target_duration_secs <= 0.0 {
            return Err(PipelineError::InvalidInput(format!(
                "target duration must be positive, got {}",
                self.target_duration_secs
            )));
        }
        if self.lyric.trim().is_empty() {
            return Err(PipelineError::InvalidInput("lyric line is empty".into()));
        }
        Ok(())
    }

    /// Tempo handed to the synthesis tool: one 4-beat measure spread over
    /// the target duration.
    pub fn tempo_bpm(&self) -> u32 {
        (4.0 * 60.0 / self.target_duration_secs).round().max(1.0) as u32
    }
}

/// Identifies one job: the batch it belongs to and its input index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId {
    pub batch: Uuid,
    pub line: usize,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.batch, self.line)
    }
}

/// States of the per-line state machine, in order. `Failed` is not a
/// variant: a failing job becomes a `JobError` carrying the last stage it
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobStage {
    Started,
    SyllablesAnalyzed,
    MidiAdjusted,
    NotesVaried,
    LyricsWritten,
    Synthesized,
    Cleaned,
    DurationAdjusted,
    Transformed,
    Finalized,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Started => "started",
            JobStage::SyllablesAnalyzed => "syllables_analyzed",
            JobStage::MidiAdjusted => "midi_adjusted",
            JobStage::NotesVaried => "notes_varied",
            JobStage::LyricsWritten => "lyrics_written",
            JobStage::Synthesized => "synthesized",
            JobStage::Cleaned => "cleaned",
            JobStage::DurationAdjusted => "duration_adjusted",
            JobStage::Transformed => "transformed",
            JobStage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Fixed intermediate file names inside a job directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    AdjustedMidi,
    VariedMidi,
    Lyrics,
    Voice,
    Cleaned,
    Adjusted,
    Transformed,
    FinalAdjusted,
    Uniform,
}

impl Artifact {
    pub const ALL: [Artifact; 9] = [
        Artifact::AdjustedMidi,
        Artifact::VariedMidi,
        Artifact::Lyrics,
        Artifact::Voice,
        Artifact::Cleaned,
        Artifact::Adjusted,
        Artifact::Transformed,
        Artifact::FinalAdjusted,
        Artifact::Uniform,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::AdjustedMidi => "adjusted.mid",
            Artifact::VariedMidi => "notes_adjusted.mid",
            Artifact::Lyrics => "lyrics.txt",
            Artifact::Voice => "voice.wav",
            Artifact::Cleaned => "cleaned.wav",
            Artifact::Adjusted => "adjusted.wav",
            Artifact::Transformed => "transformed.wav",
            Artifact::FinalAdjusted => "final_adjusted.wav",
            Artifact::Uniform => "uniform.wav",
        }
    }
}

/// Directory name of line `n` inside a batch root.
pub fn line_dir_name(line: usize) -> String {
    format!("line-{line}")
}

/// Root directory of one batch run.
#[derive(Debug, Clone)]
pub struct BatchNamespace {
    token: Uuid,
    root: PathBuf,
}

impl BatchNamespace {
    /// Create `work_dir/batch-<token>` with a fresh random token.
    pub fn create(work_dir: &Path) -> Result<Self, PipelineError> {
        let token = Uuid::new_v4();
        let root = work_dir.join(format!("batch-{token}"));
        std::fs::create_dir_all(&root).map_err(|e| PipelineError::io(&root, e))?;
        // The synthesis tool runs with its job directory as working
        // directory, so every path handed around must be absolute.
        let root = root.canonicalize().map_err(|e| PipelineError::io(&root, e))?;
        Ok(Self { token, root })
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Namespace of line `line`, creating its directory.
    pub fn job(&self, line: usize) -> Result<JobNamespace, PipelineError> {
        let dir = self.root.join(line_dir_name(line));
        std::fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(JobNamespace {
            id: JobId {
                batch: self.token,
                line,
            },
            dir,
        })
    }
}

/// Private directory of one job.
#[derive(Debug, Clone)]
pub struct JobNamespace {
    id: JobId,
    dir: PathBuf,
}

impl JobNamespace {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn spec(target: f64) -> JobSpec {
        JobSpec {
            melody_path: PathBuf::from("m.mid"),
            lyric: "hello there".into(),
            target_duration_secs: target,
            pitch_shift: 0,
            voice_model: "https://example.com/model.zip".into(),
        }
    }

    #[test]
    fn test_tempo_from_duration() {
        assert_eq!(spec(3.0).tempo_bpm(), 80);
        assert_eq!(spec(2.0).tempo_bpm(), 120);
        // 240 / 7 = 34.28...
        assert_eq!(spec(7.0).tempo_bpm(), 34);
    }

    #[test]
    fn test_validate_rejects_bad_duration_and_empty_lyric() {
        assert!(spec(3.0).validate().is_ok());
        assert!(spec(0.0).validate().is_err());
        assert!(spec(f64::NAN).validate().is_err());
        let mut blank = spec(3.0);
        blank.lyric = "   ".into();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_artifact_names_are_distinct() {
        let names: HashSet<_> = Artifact::ALL.iter().map(|a| a.file_name()).collect();
        assert_eq!(names.len(), Artifact::ALL.len());
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let work = tempfile::tempdir().unwrap();
        let a = BatchNamespace::create(work.path()).unwrap();
        let b = BatchNamespace::create(work.path()).unwrap();
        assert_ne!(a.root(), b.root());

        let j0 = a.job(0).unwrap();
        let j1 = a.job(1).unwrap();
        assert_ne!(j0.path(Artifact::Voice), j1.path(Artifact::Voice));
        assert!(j0.dir().is_dir());
        assert!(j0.dir().is_absolute());
        assert_eq!(j1.id().to_string(), format!("{}:1", a.token()));
    }
}
