// Batch orchestration: many lines in, one song out.
//
// `Batch::run` creates a fresh batch namespace, runs every job on a rayon
// pool of `max_parallel_jobs` threads, and collects the results in input
// order (rayon's indexed collect keys each result by its position, so
// completion order never matters). With one thread this is the reference
// sequential behavior.
//
// Failure policy:
// - `Abort`: the first failure cancels the run's token; jobs not yet
//   started return `Cancelled` immediately and jobs in flight stop at their
//   next stage boundary or poll. The batch returns the failure of the
//   lowest-numbered line that failed for a reason other than cancellation.
// - `Skip`: failed lines are logged and left out; the rest are joined.
//
// Surviving clips are converted to the configured output format (see
// `chanson_audio::uniform`) and concatenated in input order. A drop guard
// purges the batch's intermediates on every exit path, success, error or
// panic, unless `keep_temp` is set.

use crate::cancel::CancelToken;
use crate::config::{BatchConfig, FailurePolicy, PipelineConfig};
use crate::error::{BatchError, ErrorKind, JobError, PipelineError};
use crate::janitor::{PurgeReport, TempArtifactJanitor};
use crate::job::{Artifact, BatchNamespace, JobId, JobSpec, JobStage};
use crate::runner::{JobOutcome, PipelineRunner};
use crate::synth::STDERR_LOG;
use chanson_audio::concat::concatenate;
use chanson_audio::uniform::to_uniform;
use chanson_audio::{AudioClip, ClipFormat};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// What a batch produced.
#[derive(Debug)]
pub struct BatchReport {
    pub output: PathBuf,
    /// Successful lines, in input order.
    pub completed: Vec<JobOutcome>,
    /// Lines left out under the skip policy, in input order.
    pub failed: Vec<JobError>,
    /// `None` when intermediates were kept.
    pub purge: Option<PurgeReport>,
}

pub struct Batch {
    runner: PipelineRunner,
    config: BatchConfig,
    work_dir: PathBuf,
    output_format: ClipFormat,
    /// Per-line names beyond `Artifact` that may be left behind.
    extra_names: Vec<String>,
    keep_temp: bool,
    cancel: CancelToken,
}

impl Batch {
    pub fn new(runner: PipelineRunner, config: &PipelineConfig) -> Self {
        let mut extra_names = vec![
            format!("{}.part", Artifact::Transformed.file_name()),
            STDERR_LOG.to_string(),
        ];
        if !Artifact::ALL
            .iter()
            .any(|a| a.file_name() == config.synthesis.output_file_name)
        {
            extra_names.push(config.synthesis.output_file_name.clone());
        }
        Self {
            runner,
            config: config.batch,
            work_dir: config.work_dir.clone(),
            output_format: config.output_format.clip_format(),
            extra_names,
            keep_temp: false,
            cancel: CancelToken::new(),
        }
    }

    /// Leave intermediates on disk after the run.
    pub fn keep_temp(mut self, keep: bool) -> Self {
        self.keep_temp = keep;
        self
    }

    /// Token that aborts this batch when cancelled from outside. It stays
    /// cancelled, so later runs fail immediately. Aborts caused by a failing
    /// line use a per-run child token and only stop that run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(&self, jobs: &[JobSpec], output: &Path) -> Result<BatchReport, BatchError> {
        if jobs.is_empty() {
            return Err(BatchError::InvalidInput("no lines to synthesize".into()));
        }
        let namespace = BatchNamespace::create(&self.work_dir).map_err(BatchError::Output)?;
        info!(
            batch = %namespace.token(),
            lines = jobs.len(),
            root = %namespace.root().display(),
            "starting batch"
        );
        let mut guard = CleanupGuard {
            janitor: TempArtifactJanitor::new(namespace.root()),
            line_count: jobs.len(),
            extra_names: &self.extra_names,
            armed: !self.keep_temp,
        };

        let cancel = self.cancel.child();
        let results = self.run_jobs(&namespace, jobs, &cancel)?;

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => completed.push(outcome),
                Err(err) => failed.push(err),
            }
        }

        if self.config.failure_policy == FailurePolicy::Abort && !failed.is_empty() {
            return Err(BatchError::Job(root_cause(failed)));
        }
        for err in &failed {
            warn!(line = err.line, stage = %err.stage, error = %err.source, "skipping failed line");
        }
        if completed.is_empty() {
            return Err(BatchError::NothingToConcatenate {
                failed: failed.len(),
            });
        }

        self.assemble(&namespace, &completed, output)
            .map_err(BatchError::Output)?;
        info!(
            output = %output.display(),
            lines = completed.len(),
            skipped = failed.len(),
            "batch finished"
        );

        let purge = guard.finish();
        Ok(BatchReport {
            output: output.to_path_buf(),
            completed,
            failed,
            purge,
        })
    }

    fn run_jobs(
        &self,
        namespace: &BatchNamespace,
        jobs: &[JobSpec],
        cancel: &CancelToken,
    ) -> Result<Vec<Result<JobOutcome, JobError>>, BatchError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_parallel_jobs.max(1))
            .thread_name(|i| format!("chanson-job-{i}"))
            .build()
            .map_err(|e| BatchError::Output(PipelineError::Config(e.to_string())))?;
        let abort_on_failure = self.config.failure_policy == FailurePolicy::Abort;

        Ok(pool.install(|| {
            jobs.par_iter()
                .enumerate()
                .map(|(line, job)| {
                    let result = self.run_one(namespace, line, job, cancel);
                    if abort_on_failure && result.is_err() && !cancel.is_cancelled() {
                        cancel.cancel();
                    }
                    result
                })
                .collect()
        }))
    }

    fn run_one(
        &self,
        namespace: &BatchNamespace,
        line: usize,
        job: &JobSpec,
        cancel: &CancelToken,
    ) -> Result<JobOutcome, JobError> {
        let not_started = |source| JobError {
            line,
            job_id: JobId {
                batch: namespace.token(),
                line,
            },
            stage: JobStage::Started,
            source,
        };
        cancel.check().map_err(not_started)?;
        let job_ns = namespace.job(line).map_err(not_started)?;
        self.runner.run(job, &job_ns, cancel)
    }

    /// Convert every finished clip to the output format and join them.
    fn assemble(
        &self,
        namespace: &BatchNamespace,
        completed: &[JobOutcome],
        output: &Path,
    ) -> Result<(), PipelineError> {
        let mut uniform_clips = Vec::with_capacity(completed.len());
        for outcome in completed {
            let clip = AudioClip::read_wav(&outcome.final_clip)?;
            let uniform = to_uniform(&clip, self.output_format);
            let path = namespace.job(outcome.line)?.path(Artifact::Uniform);
            uniform.write_wav(&path)?;
            uniform_clips.push(path);
        }
        concatenate(output, &uniform_clips)?;
        Ok(())
    }
}

/// The failure to report for an aborted batch: the first line that failed
/// on its own rather than because another line cancelled it.
fn root_cause(mut failed: Vec<JobError>) -> JobError {
    let index = failed
        .iter()
        .position(|e| e.kind() != ErrorKind::Cancelled)
        .unwrap_or(0);
    let cause = failed.swap_remove(index);
    error!(line = cause.line, stage = %cause.stage, error = %cause.source, "aborting batch");
    cause
}

/// Purges the batch's intermediates when dropped, unless disarmed.
struct CleanupGuard<'a> {
    janitor: TempArtifactJanitor,
    line_count: usize,
    extra_names: &'a [String],
    armed: bool,
}

impl CleanupGuard<'_> {
    /// Purge now and report; the drop becomes a no-op.
    fn finish(&mut self) -> Option<PurgeReport> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        Some(self.janitor.purge(self.line_count, self.extra_names))
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.finish();
        }
    }
}
