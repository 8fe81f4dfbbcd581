// chanson: command-line entry point.
//
// Reads one lyric line per non-empty line of `--lyrics-file`, pairs each
// with the MIDI file at the same position in `--midi-files`, and renders
// the whole song to `--output`.
//
// Usage:
//   chanson --midi-files a.mid b.mid --lyrics-file verse.txt \
//     --output song.wav --voice-model https://.../voice.zip \
//     [--target-duration 3.0] [--pitch 0] [--config chanson.json]
//     [--api-token TOKEN] [--jobs N] [--keep-temp] [--lexicon words.json]
//
// Logging goes through tracing; set RUST_LOG to change the level (default
// `info`). Exit status is 0 on success and 1 on any failure.

use chanson_music::syllables::{HeuristicCounter, LexiconCounter, SyllableCounter};
use chanson_pipeline::synth::Midi2Voice;
use chanson_pipeline::transform::ReplicateTransformer;
use chanson_pipeline::{
    Batch, BatchReport, JobSpec, PipelineConfig, PipelineError, PipelineRunner,
};
use clap::Parser;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "chanson", version, about = "Sing lyric lines over melodies and join them into one track")]
struct Cli {
    /// One MIDI melody per lyric line, in order.
    #[arg(long = "midi-files", num_args = 1.., required = true)]
    midi_files: Vec<PathBuf>,

    /// Text file with one lyric line per non-empty line.
    #[arg(long)]
    lyrics_file: PathBuf,

    /// Where to write the combined WAV.
    #[arg(long, short)]
    output: PathBuf,

    /// Length of every sung line, in seconds.
    #[arg(long, default_value_t = 3.0)]
    target_duration: f64,

    /// Pitch shift for the voice transform, in semitones.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pitch: i32,

    /// URL or local archive of the RVC voice model.
    #[arg(long, default_value = "")]
    voice_model: String,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Token for the voice transform API.
    #[arg(long)]
    api_token: Option<String>,

    /// Lines to process in parallel.
    #[arg(long)]
    jobs: Option<usize>,

    /// Keep intermediate files after the run.
    #[arg(long)]
    keep_temp: bool,

    /// JSON file of syllable count overrides.
    #[arg(long)]
    lexicon: Option<PathBuf>,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn read_lyrics(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Reject a run that could not produce any line before work starts.
fn check_inputs(
    midi_count: usize,
    lyric_count: usize,
    voice_model: &str,
) -> Result<(), Box<dyn Error>> {
    if lyric_count != midi_count {
        return Err(format!(
            "{midi_count} MIDI files but {lyric_count} lyric lines; they must match"
        )
        .into());
    }
    if voice_model.trim().is_empty() {
        return Err(PipelineError::MissingVoiceModel.into());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<BatchReport, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(token) = cli.api_token {
        config.transform.api_token = Some(token);
    }
    if let Some(jobs) = cli.jobs {
        config.batch.max_parallel_jobs = jobs;
    }
    if let Some(lexicon) = cli.lexicon {
        config.lexicon_path = Some(lexicon);
    }
    config.validate()?;

    let lyrics = read_lyrics(&cli.lyrics_file)?;
    check_inputs(cli.midi_files.len(), lyrics.len(), &cli.voice_model)?;

    let counter: Arc<dyn SyllableCounter> = match &config.lexicon_path {
        Some(path) => {
            let lexicon = LexiconCounter::load(path)?;
            info!(entries = lexicon.len(), path = %path.display(), "loaded syllable lexicon");
            Arc::new(lexicon)
        }
        None => Arc::new(HeuristicCounter),
    };
    let runner = PipelineRunner::new(
        &config,
        counter,
        Arc::new(Midi2Voice::new(config.synthesis.clone())),
        Arc::new(ReplicateTransformer::new(config.transform.clone())?),
    )?;

    let jobs: Vec<JobSpec> = cli
        .midi_files
        .into_iter()
        .zip(lyrics)
        .map(|(melody_path, lyric)| JobSpec {
            melody_path,
            lyric,
            target_duration_secs: cli.target_duration,
            pitch_shift: cli.pitch,
            voice_model: cli.voice_model.clone(),
        })
        .collect();

    let batch = Batch::new(runner, &config).keep_temp(cli.keep_temp);
    Ok(batch.run(&jobs, &cli.output)?)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(report) => {
            info!(
                output = %report.output.display(),
                lines = report.completed.len(),
                skipped = report.failed.len(),
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "chanson failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanson_pipeline::ErrorKind;

    #[test]
    fn test_blank_voice_model_rejected_up_front() {
        for model in ["", "   "] {
            let err = check_inputs(2, 2, model).unwrap_err();
            let err = err.downcast::<PipelineError>().unwrap();
            assert_eq!(err.kind(), ErrorKind::MissingVoiceModel);
        }
    }

    #[test]
    fn test_line_count_mismatch_rejected() {
        let err = check_inputs(3, 2, "https://example.com/voice.zip").unwrap_err();
        assert!(err.to_string().contains("3 MIDI files but 2 lyric lines"));
    }

    #[test]
    fn test_matching_inputs_accepted() {
        assert!(check_inputs(2, 2, "voice.zip").is_ok());
    }

    #[test]
    fn test_cli_parses_voice_model() {
        let cli = Cli::try_parse_from([
            "chanson",
            "--midi-files",
            "a.mid",
            "b.mid",
            "--lyrics-file",
            "verse.txt",
            "--output",
            "song.wav",
            "--voice-model",
            "voice.zip",
            "--pitch",
            "-2",
        ])
        .unwrap();
        assert_eq!(cli.midi_files.len(), 2);
        assert_eq!(cli.voice_model, "voice.zip");
        assert_eq!(cli.pitch, -2);
    }
}
