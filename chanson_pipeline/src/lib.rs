// Chanson pipeline: lyric lines and melodies in, one sung track out.
//
// For every (melody, lyric line) pair the runner quantizes the line's
// syllables onto one measure, rewrites the melody to that rhythm, has an
// external tool sing it, trims and length-fits the clip, re-voices it
// through a remote voice-conversion model, and fits it to length again.
// The batch layer runs lines in parallel, keeps results in input order,
// joins them into one file, and always cleans up after itself.
//
// Architecture:
// - config.rs: PipelineConfig (JSON, serde defaults)
// - error.rs: PipelineError / ErrorKind, JobError, BatchError
// - job.rs: JobSpec, JobId, JobStage, Artifact names, batch and job
//   namespaces on disk
// - cancel.rs: CancelToken shared across a batch
// - synth.rs: VoiceSynthesizer seam, midi2voice process adapter, lyric
//   scratch file
// - transform.rs: VoiceTransformer seam, prediction-API adapter
// - runner.rs: per-line state machine
// - batch.rs: parallel batch, failure policy, uniform conversion and
//   concatenation, cleanup guard
// - janitor.rs: best-effort removal of intermediates
//
// The binary (`main.rs`) wires these together behind a small CLI.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod janitor;
pub mod job;
pub mod runner;
pub mod synth;
pub mod transform;

pub use batch::{Batch, BatchReport};
pub use cancel::CancelToken;
pub use config::PipelineConfig;
pub use error::{BatchError, ErrorKind, JobError, PipelineError};
pub use job::{JobSpec, JobStage};
pub use runner::{Advisory, JobOutcome, PipelineRunner};
