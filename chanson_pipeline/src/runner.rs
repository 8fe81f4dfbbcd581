// Per-line pipeline state machine.
//
// `PipelineRunner::run` takes one `JobSpec` through every stage in order,
// writing each stage's artifact into the job's namespace:
//
//   Started -> SyllablesAnalyzed -> MidiAdjusted (adjusted.mid)
//     -> NotesVaried (notes_adjusted.mid) -> LyricsWritten (lyrics.txt)
//     -> Synthesized (voice.wav) -> Cleaned (cleaned.wav)
//     -> DurationAdjusted (adjusted.wav) -> Transformed (transformed.wav)
//     -> Finalized (final_adjusted.wav)
//
// Each stage runs once. The first error ends the job: it is logged with
// the line id and the last stage reached, then returned as a `JobError`.
// The cancel token is checked at every stage boundary.
//
// Silence detection finding nothing is not an error. The runner records an
// `Advisory`, keeps the untrimmed clip, and carries on; the duration check
// after normalization is what catches a clip that really is unusable.
//
// The runner holds no per-job state, so one runner can serve many jobs at
// once from different threads. Namespaces keep their files apart.

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{JobError, PipelineError};
use crate::job::{Artifact, JobId, JobNamespace, JobSpec, JobStage};
use crate::synth::{LyricScratch, SynthesisRequest, VoiceSynthesizer};
use crate::transform::{TransformRequest, VoiceTransformer};
use chanson_audio::AudioClip;
use chanson_audio::stretch::normalize;
use chanson_audio::trim::{TrimOutcome, TrimParams, trim};
use chanson_music::adjust::{add_variation, adjust, apply_variation};
use chanson_music::melody::Melody;
use chanson_music::quantize::{DurationPlan, Quantizer, StressMap};
use chanson_music::syllables::{LyricLine, SyllableCounter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// Non-fatal conditions noticed while running a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Trimming found no sound in `clip`; it was kept as is.
    SilenceDetectionEmpty { clip: PathBuf },
}

/// A finished job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub line: usize,
    pub job_id: JobId,
    pub final_clip: PathBuf,
    pub syllables: usize,
    pub plan: DurationPlan,
    pub advisories: Vec<Advisory>,
}

pub struct PipelineRunner {
    quantizer: Quantizer,
    stress: StressMap,
    trim: TrimParams,
    counter: Arc<dyn SyllableCounter>,
    synthesizer: Arc<dyn VoiceSynthesizer>,
    transformer: Arc<dyn VoiceTransformer>,
}

/// Mutable bookkeeping for one `run` call.
struct Progress {
    stage: JobStage,
    advisories: Vec<Advisory>,
    syllables: usize,
}

impl Progress {
    fn reach(&mut self, stage: JobStage) {
        debug!(from = %self.stage, to = %stage, "stage complete");
        self.stage = stage;
    }
}

impl PipelineRunner {
    pub fn new(
        config: &PipelineConfig,
        counter: Arc<dyn SyllableCounter>,
        synthesizer: Arc<dyn VoiceSynthesizer>,
        transformer: Arc<dyn VoiceTransformer>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            quantizer: config.quantize.quantizer()?,
            stress: config.quantize.stress_map(),
            trim: config.trim.params(),
            counter,
            synthesizer,
            transformer,
        })
    }

    /// Run one job to completion inside `namespace`.
    pub fn run(
        &self,
        job: &JobSpec,
        namespace: &JobNamespace,
        cancel: &CancelToken,
    ) -> Result<JobOutcome, JobError> {
        let id = namespace.id();
        let span = info_span!("job", line = id.line, job_id = %id);
        let _enter = span.enter();
        info!(melody = %job.melody_path.display(), lyric = %job.lyric, "starting line");

        let mut progress = Progress {
            stage: JobStage::Started,
            advisories: Vec::new(),
            syllables: 0,
        };
        match self.run_stages(job, namespace, cancel, &mut progress) {
            Ok((final_clip, plan)) => {
                info!(clip = %final_clip.display(), "line finished");
                Ok(JobOutcome {
                    line: id.line,
                    job_id: id,
                    final_clip,
                    syllables: progress.syllables,
                    plan,
                    advisories: progress.advisories,
                })
            }
            Err(source) => {
                error!(stage = %progress.stage, error = %source, "line failed");
                Err(JobError {
                    line: id.line,
                    job_id: id,
                    stage: progress.stage,
                    source,
                })
            }
        }
    }

    fn run_stages(
        &self,
        job: &JobSpec,
        ns: &JobNamespace,
        cancel: &CancelToken,
        progress: &mut Progress,
    ) -> Result<(PathBuf, DurationPlan), PipelineError> {
        job.validate()?;

        cancel.check()?;
        let line = LyricLine::analyze(&job.lyric, self.counter.as_ref());
        let syllables = line.total_syllables();
        let plan = self.quantizer.quantize(syllables, &self.stress)?;
        info!(syllables, durations = ?plan.durations(), "quantized line");
        progress.syllables = syllables;
        progress.reach(JobStage::SyllablesAnalyzed);

        cancel.check()?;
        let source = Melody::read_smf(&job.melody_path)?;
        let adjusted = adjust(&source, &plan)?;
        adjusted.write_smf(&ns.path(Artifact::AdjustedMidi))?;
        progress.reach(JobStage::MidiAdjusted);

        cancel.check()?;
        let variation = add_variation(&source, &plan)?;
        let varied = apply_variation(&adjusted, &plan, &variation)?;
        let varied_path = ns.path(Artifact::VariedMidi);
        varied.write_smf(&varied_path)?;
        progress.reach(JobStage::NotesVaried);

        cancel.check()?;
        let voice_path = ns.path(Artifact::Voice);
        {
            let lyrics = LyricScratch::write(ns.path(Artifact::Lyrics), &job.lyric)?;
            progress.reach(JobStage::LyricsWritten);

            let request = SynthesisRequest {
                melody_path: &varied_path,
                lyrics_path: lyrics.path(),
                tempo_bpm: job.tempo_bpm(),
                work_dir: ns.dir(),
                output_path: &voice_path,
            };
            self.synthesizer.synthesize(&request, cancel)?;
        }
        progress.reach(JobStage::Synthesized);

        cancel.check()?;
        let voice = AudioClip::read_wav(&voice_path)?;
        let cleaned_path = ns.path(Artifact::Cleaned);
        let cleaned = match trim(&voice, &self.trim) {
            TrimOutcome::Trimmed { clip, span } => {
                debug!(start = span.start, end = span.end, "trimmed silence");
                clip
            }
            TrimOutcome::SilenceDetectionEmpty(clip) => {
                warn!(clip = %voice_path.display(), "no sound detected; keeping untrimmed clip");
                progress.advisories.push(Advisory::SilenceDetectionEmpty {
                    clip: voice_path.clone(),
                });
                clip
            }
        };
        cleaned.write_wav(&cleaned_path)?;
        info!(secs = cleaned.duration_secs(), "duration after trimming");
        progress.reach(JobStage::Cleaned);

        cancel.check()?;
        let adjusted_path = ns.path(Artifact::Adjusted);
        fit_duration(&cleaned, job.target_duration_secs, &adjusted_path)?;
        progress.reach(JobStage::DurationAdjusted);

        cancel.check()?;
        let transformed_path = ns.path(Artifact::Transformed);
        let request = TransformRequest {
            input_path: &adjusted_path,
            pitch_shift: job.pitch_shift,
            voice_model: &job.voice_model,
            output_path: &transformed_path,
        };
        self.transformer.transform(&request, cancel)?;
        progress.reach(JobStage::Transformed);

        // The service returns its own length; bring it back to the target.
        cancel.check()?;
        let final_path = ns.path(Artifact::FinalAdjusted);
        let transformed = AudioClip::read_wav(&transformed_path)?;
        fit_duration(&transformed, job.target_duration_secs, &final_path)?;
        progress.reach(JobStage::Finalized);

        Ok((final_path, plan))
    }
}

/// Normalize `clip` to `target_secs`, refuse an empty result, and write it.
fn fit_duration(clip: &AudioClip, target_secs: f64, output: &Path) -> Result<(), PipelineError> {
    let fitted = normalize(clip, target_secs)?;
    if fitted.frames() == 0 {
        return Err(PipelineError::DegenerateOutput {
            artifact: output.to_path_buf(),
            detail: format!("normalizing {} to {target_secs}s left no samples", clip.name),
        });
    }
    fitted.write_wav(output)?;
    info!(secs = fitted.duration_secs(), clip = %output.display(), "duration adjusted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanson_audio::ClipFormat;

    #[test]
    fn test_fit_duration_writes_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("adjusted.wav");
        let clip = AudioClip::new("c", ClipFormat::pcm16(1, 8000), vec![0.25; 16000]);
        fit_duration(&clip, 3.0, &out).unwrap();
        let back = AudioClip::read_wav(&out).unwrap();
        assert_eq!(back.frames(), 24000);
    }

    #[test]
    fn test_fit_duration_rejects_vanishing_clip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("adjusted.wav");
        // 8000 frames at 8 kHz scaled to 10 microseconds rounds to 0 frames.
        let clip = AudioClip::new("c", ClipFormat::pcm16(1, 8000), vec![0.25; 8000]);
        let err = fit_duration(&clip, 0.00001, &out).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DegenerateOutput);
        assert!(!out.exists());
    }

    #[test]
    fn test_fit_duration_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let clip = AudioClip::new("c", ClipFormat::pcm16(1, 8000), Vec::new());
        let err = fit_duration(&clip, 3.0, &dir.path().join("a.wav")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::EmptySourceClip);
    }
}
