// Data-driven pipeline configuration.
//
// Every tunable the pipeline uses lives in `PipelineConfig`, loaded from
// JSON. Each section is `#[serde(default)]`, so a config file only needs
// the fields it changes; `PipelineConfig::default()` is the reference
// setup (4/4 measures, stress on syllables 0 and 2, midi2voice through
// Python, -40 dB trimming with 250 ms padding, the pinned rvc-v2 model,
// 44.1 kHz stereo 16-bit output, one job at a time, abort on failure).
//
// Sections:
// - `quantize`: measure length, stress bonus and stressed positions
// - `synthesis`: the external text+melody synthesizer's command line
// - `trim`: silence detection thresholds and padding
// - `transform`: the remote voice-conversion endpoint and its fixed
//   conversion parameters
// - `output_format`: the shared format every clip is converted to before
//   concatenation
// - `batch`: parallelism and failure policy

use crate::error::PipelineError;
use chanson_audio::ClipFormat;
use chanson_audio::trim::TrimParams;
use chanson_music::MusicError;
use chanson_music::quantize::{Quantizer, StressMap};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Version of `pseudoram/rvc-v2` the conversion parameters are tuned for.
pub const DEFAULT_MODEL_VERSION: &str =
    "d18e2e0a6a6d3af183cc09622cebba8555ec9a9e66983261fc64c8b1572b7dce";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory under which each batch creates its namespace.
    pub work_dir: PathBuf,
    /// Optional JSON `{"word": count}` file of syllable overrides.
    pub lexicon_path: Option<PathBuf>,
    pub quantize: QuantizeConfig,
    pub synthesis: SynthesisConfig,
    pub trim: TrimConfig,
    pub transform: TransformConfig,
    pub output_format: OutputFormatConfig,
    pub batch: BatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("chanson"),
            lexicon_path: None,
            quantize: QuantizeConfig::default(),
            synthesis: SynthesisConfig::default(),
            trim: TrimConfig::default(),
            transform: TransformConfig::default(),
            output_format: OutputFormatConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_json(&json)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that serde cannot express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.quantize.quantizer().map_err(|e| match e {
            MusicError::InvalidInput(msg) => PipelineError::Config(msg),
            other => PipelineError::Config(other.to_string()),
        })?;
        if self.batch.max_parallel_jobs == 0 {
            return Err(PipelineError::Config(
                "batch.max_parallel_jobs must be at least 1".into(),
            ));
        }
        let format = &self.output_format;
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(PipelineError::Config(
                "output_format needs at least one channel and a nonzero sample rate".into(),
            ));
        }
        if !matches!(format.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(PipelineError::Config(format!(
                "output_format.bits_per_sample must be 8, 16, 24 or 32, got {}",
                format.bits_per_sample
            )));
        }
        if self.synthesis.output_file_name.is_empty() {
            return Err(PipelineError::Config(
                "synthesis.output_file_name is empty".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    pub beats_per_measure: f64,
    /// Beats added to each stressed syllable before snapping.
    pub stress_increment: f64,
    /// Zero-based syllable positions that get the stress bonus.
    pub stressed_indices: Vec<usize>,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            beats_per_measure: 4.0,
            stress_increment: 0.5,
            stressed_indices: vec![0, 2],
        }
    }
}

impl QuantizeConfig {
    pub fn quantizer(&self) -> Result<Quantizer, MusicError> {
        Quantizer::new(self.beats_per_measure, self.stress_increment)
    }

    pub fn stress_map(&self) -> StressMap {
        self.stressed_indices.iter().copied().collect()
    }
}

/// Command line of the external synthesizer. The tool is run as
/// `program leading_args... -l <lyrics> -m <midi> -lang <language>
/// -g <gender> -i <voice_index> -t <bpm>` inside the job directory and
/// must leave `output_file_name` there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub program: String,
    pub leading_args: Vec<String>,
    pub language: String,
    pub gender: String,
    pub voice_index: u32,
    pub output_file_name: String,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            program: "python".into(),
            leading_args: vec!["-m".into(), "midi2voice".into()],
            language: "english".into(),
            gender: "male".into(),
            voice_index: 0,
            output_file_name: "voice.wav".into(),
            timeout_secs: 300,
        }
    }
}

impl SynthesisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrimConfig {
    pub silence_threshold_db: f64,
    pub min_silence_run_ms: u32,
    pub padding_ms: u32,
}

impl Default for TrimConfig {
    fn default() -> Self {
        let params = TrimParams::default();
        Self {
            silence_threshold_db: params.silence_threshold_db,
            min_silence_run_ms: params.min_silence_run_ms,
            padding_ms: params.padding_ms,
        }
    }
}

impl TrimConfig {
    pub fn params(&self) -> TrimParams {
        TrimParams {
            silence_threshold_db: self.silence_threshold_db,
            min_silence_run_ms: self.min_silence_run_ms,
            padding_ms: self.padding_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub api_base: String,
    pub model_version: String,
    /// Bearer token for the prediction API.
    pub api_token: Option<String>,
    pub protect: f64,
    pub f0_method: String,
    pub index_rate: f64,
    pub rms_mix_rate: f64,
    pub filter_radius: u32,
    pub crepe_hop_length: u32,
    pub output_format: String,
    /// Upper bound on one prediction, from submission to downloaded asset.
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".into(),
            model_version: DEFAULT_MODEL_VERSION.into(),
            api_token: None,
            protect: 0.5,
            f0_method: "rmvpe".into(),
            index_rate: 0.3,
            rms_mix_rate: 0.25,
            filter_radius: 3,
            crepe_hop_length: 128,
            output_format: "wav".into(),
            timeout_secs: 600,
            poll_interval_ms: 1000,
        }
    }
}

impl TransformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFormatConfig {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl Default for OutputFormatConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
        }
    }
}

impl OutputFormatConfig {
    pub fn clip_format(&self) -> ClipFormat {
        ClipFormat {
            bits_per_sample: self.bits_per_sample,
            ..ClipFormat::pcm16(self.channels, self.sample_rate)
        }
    }
}

/// What the batch does when one line fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel the remaining lines and fail the batch.
    #[default]
    Abort,
    /// Leave the line out of the song and keep going.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_parallel_jobs: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 1,
            failure_policy: FailurePolicy::Abort,
        }
    }
}
