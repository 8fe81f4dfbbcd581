// Voice synthesis adapter.
//
// `VoiceSynthesizer` is the seam between the runner and whatever turns a
// melody plus lyric text into a sung WAV. The production implementation,
// `Midi2Voice`, shells out to the midi2voice tool; tests substitute an
// in-process fake.
//
// The lyric text is handed over as a single-line file. `LyricScratch` owns
// that file and deletes it when dropped, so it disappears whether the
// synthesizer succeeds, fails or panics.
//
// The tool always writes the same output name into its working directory.
// Running it inside the job's own directory keeps concurrent jobs apart;
// the result is then moved to `Artifact::Voice` if the names differ. The
// tool's stderr is captured in `STDERR_LOG` next to it and removed once
// read.

use crate::cancel::CancelToken;
use crate::config::SynthesisConfig;
use crate::error::PipelineError;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often the child process is polled for exit or cancellation.
const PROCESS_POLL: Duration = Duration::from_millis(100);

/// Where the tool's stderr is captured inside the job directory.
pub const STDERR_LOG: &str = "synth_stderr.log";

/// Inputs to one synthesis call. All paths are absolute.
#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub melody_path: &'a Path,
    pub lyrics_path: &'a Path,
    pub tempo_bpm: u32,
    /// Directory the tool may write into.
    pub work_dir: &'a Path,
    /// Where the finished clip must end up.
    pub output_path: &'a Path,
}

pub trait VoiceSynthesizer: Send + Sync {
    /// Render the request to `request.output_path`. Any failure is fatal
    /// for the job and is not retried.
    fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError>;
}

// ---------------------------------------------------------------------------
// Lyric scratch file
// ---------------------------------------------------------------------------

/// A lyric line written to disk, removed on drop.
#[derive(Debug)]
pub struct LyricScratch {
    path: PathBuf,
}

impl LyricScratch {
    pub fn write(path: PathBuf, lyric: &str) -> Result<Self, PipelineError> {
        // The tool reads one line; embedded newlines would split the verse.
        let line = lyric.split_whitespace().collect::<Vec<_>>().join(" ");
        std::fs::write(&path, line).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LyricScratch {
    fn drop(&mut self) {
        remove_scratch(&self.path, "lyric scratch file");
    }
}

// ---------------------------------------------------------------------------
// midi2voice
// ---------------------------------------------------------------------------

/// Runs the configured synthesis command.
#[derive(Debug, Clone)]
pub struct Midi2Voice {
    config: SynthesisConfig,
}

impl Midi2Voice {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config }
    }

    /// Arguments after `program`, in the tool's expected order.
    pub fn arguments(&self, request: &SynthesisRequest<'_>) -> Vec<String> {
        let mut args = self.config.leading_args.clone();
        args.extend([
            "-l".to_string(),
            request.lyrics_path.display().to_string(),
            "-m".to_string(),
            request.melody_path.display().to_string(),
            "-lang".to_string(),
            self.config.language.clone(),
            "-g".to_string(),
            self.config.gender.clone(),
            "-i".to_string(),
            self.config.voice_index.to_string(),
            "-t".to_string(),
            request.tempo_bpm.to_string(),
        ]);
        args
    }

    fn wait(&self, child: &mut Child, cancel: &CancelToken) -> Result<ExitStatus, PipelineError> {
        let timeout = self.config.timeout();
        let started = Instant::now();
        loop {
            let status = child.try_wait().map_err(|e| {
                PipelineError::SynthesisFailed(format!("waiting for {}: {e}", self.config.program))
            })?;
            if let Some(status) = status {
                return Ok(status);
            }
            if cancel.is_cancelled() {
                kill(child);
                return Err(PipelineError::Cancelled);
            }
            if started.elapsed() >= timeout {
                kill(child);
                return Err(PipelineError::SynthesisFailed(format!(
                    "{} timed out after {}s",
                    self.config.program,
                    timeout.as_secs()
                )));
            }
            std::thread::sleep(PROCESS_POLL);
        }
    }
}

/// Remove a scratch file, warning on anything but "already gone".
fn remove_scratch(path: &Path, what: &str) {
    let failure = std::fs::remove_file(path)
        .err()
        .filter(|e| e.kind() != std::io::ErrorKind::NotFound);
    if let Some(e) = failure {
        warn!(path = %path.display(), error = %e, "failed to remove {what}");
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl VoiceSynthesizer for Midi2Voice {
    fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError> {
        cancel.check()?;
        let args = self.arguments(request);
        debug!(program = %self.config.program, ?args, "running synthesizer");

        // A file, not a pipe: processes the tool leaves running in the
        // background must not be able to hold up reading it.
        let log_path = request.work_dir.join(STDERR_LOG);
        let log = File::create(&log_path).map_err(|e| PipelineError::io(&log_path, e))?;
        let spawned = Command::new(&self.config.program)
            .args(&args)
            .current_dir(request.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                remove_scratch(&log_path, "synthesizer log");
                return Err(PipelineError::SynthesisFailed(format!(
                    "failed to start {}: {e}",
                    self.config.program
                )));
            }
        };

        let waited = self.wait(&mut child, cancel);
        let stderr_text = std::fs::read_to_string(&log_path).unwrap_or_default();
        remove_scratch(&log_path, "synthesizer log");
        let status = waited?;
        if !status.success() {
            return Err(PipelineError::SynthesisFailed(format!(
                "{} exited with {status}: {}",
                self.config.program,
                stderr_text.trim()
            )));
        }

        let produced = request.work_dir.join(&self.config.output_file_name);
        if !produced.is_file() {
            return Err(PipelineError::SynthesisFailed(format!(
                "{} succeeded but did not write {}",
                self.config.program,
                produced.display()
            )));
        }
        if produced != request.output_path {
            std::fs::rename(&produced, request.output_path)
                .map_err(|e| PipelineError::io(&produced, e))?;
        }
        Ok(())
    }
}
