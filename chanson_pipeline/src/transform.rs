// Voice transform adapter.
//
// `VoiceTransformer` re-renders a clip in another voice's timbre. The
// production implementation, `ReplicateTransformer`, drives the rvc-v2
// model through the prediction HTTP API:
//
// 1. POST `{api_base}/predictions` with the pinned model version and the
//    conversion inputs. The clip travels inline as a base64 `data:` URI,
//    and so does the voice model when it is a local archive rather than a
//    URL. `Prefer: wait` lets short predictions finish in this one request.
// 2. While the prediction is `starting` or `processing`, GET its `urls.get`
//    every `poll_interval_ms` until it settles or `timeout_secs` runs out.
// 3. On `succeeded`, `output` is either a bare URL string or an object with
//    a `url` field (`TransformOutput`); the asset is downloaded to a `.part`
//    file and renamed into place.
//
// Every network or service failure is `VoiceTransformFailed`; nothing is
// retried here. An empty voice model reference is rejected before any
// request is made.

use crate::cancel::CancelToken;
use crate::config::TransformConfig;
use crate::error::PipelineError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Inputs to one transform call.
#[derive(Debug, Clone)]
pub struct TransformRequest<'a> {
    pub input_path: &'a Path,
    /// Semitones.
    pub pitch_shift: i32,
    /// URL or local archive path of the voice model.
    pub voice_model: &'a str,
    pub output_path: &'a Path,
}

pub trait VoiceTransformer: Send + Sync {
    fn transform(
        &self,
        request: &TransformRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError>;
}

/// The two shapes a successful prediction's `output` may take.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TransformOutput {
    Url(String),
    Object { url: String },
}

impl TransformOutput {
    pub fn from_value(value: &Value) -> Result<Self, PipelineError> {
        let shape_error = || PipelineError::UnexpectedResponseShape(value.to_string());
        if !(value.is_string() || value.is_object()) {
            return Err(shape_error());
        }
        serde_json::from_value(value.clone()).map_err(|_| shape_error())
    }

    pub fn url(&self) -> &str {
        match self {
            TransformOutput::Url(url) | TransformOutput::Object { url } => url,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    /// `Ok(Some)` once succeeded, `Ok(None)` while still running.
    fn settled_output(&self) -> Result<Option<TransformOutput>, PipelineError> {
        match self.status.as_str() {
            "succeeded" => {
                let output = self.output.as_ref().unwrap_or(&Value::Null);
                TransformOutput::from_value(output).map(Some)
            }
            "failed" | "canceled" => {
                let detail = match &self.error {
                    Some(Value::String(msg)) => msg.clone(),
                    Some(other) => other.to_string(),
                    None => "no error detail".to_string(),
                };
                Err(PipelineError::VoiceTransformFailed(format!(
                    "prediction {} {}: {detail}",
                    self.id.as_deref().unwrap_or("?"),
                    self.status
                )))
            }
            _ => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Replicate client
// ---------------------------------------------------------------------------

pub struct ReplicateTransformer {
    config: TransformConfig,
    client: Client,
}

impl ReplicateTransformer {
    pub fn new(config: TransformConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .user_agent(concat!("chanson/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("failed building HTTP client: {e}")))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: TransformConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// The `input` object of a prediction request.
    pub fn prediction_input(&self, audio_uri: &str, pitch_shift: i32, model_uri: &str) -> Value {
        let cfg = &self.config;
        json!({
            "protect": cfg.protect,
            "f0_method": cfg.f0_method,
            "rvc_model": "CUSTOM",
            "custom_rvc_model_download_url": model_uri,
            "input_audio": audio_uri,
            "index_rate": cfg.index_rate,
            "pitch_change": pitch_shift,
            "rms_mix_rate": cfg.rms_mix_rate,
            "filter_radius": cfg.filter_radius,
            "output_format": cfg.output_format,
            "crepe_hop_length": cfg.crepe_hop_length,
        })
    }

    fn token(&self) -> Result<&str, PipelineError> {
        self.config
            .api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::VoiceTransformFailed("no API token configured".into()))
    }

    fn submit(&self, input: Value, token: &str) -> Result<Prediction, PipelineError> {
        let url = format!("{}/predictions", self.config.api_base.trim_end_matches('/'));
        let body = json!({ "version": self.config.model_version, "input": input });
        self.client
            .post(&url)
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Prediction>())
            .map_err(|e| PipelineError::VoiceTransformFailed(format!("POST {url}: {e}")))
    }

    fn fetch(&self, url: &str, token: &str) -> Result<Prediction, PipelineError> {
        self.client
            .get(url)
            .bearer_auth(token)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Prediction>())
            .map_err(|e| PipelineError::VoiceTransformFailed(format!("GET {url}: {e}")))
    }

    fn wait_for_output(
        &self,
        mut prediction: Prediction,
        token: &str,
        cancel: &CancelToken,
    ) -> Result<TransformOutput, PipelineError> {
        let deadline = Instant::now() + self.config.timeout();
        loop {
            if let Some(output) = prediction.settled_output()? {
                return Ok(output);
            }
            let Some(poll_url) = prediction.urls.as_ref().and_then(|u| u.get.clone()) else {
                return Err(PipelineError::VoiceTransformFailed(format!(
                    "prediction is {} but has no polling URL",
                    prediction.status
                )));
            };
            if Instant::now() >= deadline {
                return Err(PipelineError::VoiceTransformFailed(format!(
                    "prediction still {} after {}s",
                    prediction.status, self.config.timeout_secs
                )));
            }
            cancel.sleep(self.config.poll_interval())?;
            prediction = self.fetch(&poll_url, token)?;
            debug!(status = %prediction.status, "polled prediction");
        }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), PipelineError> {
        let partial = part_path(dest);
        let result = (|| -> Result<(), PipelineError> {
            let mut response = self
                .client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| PipelineError::VoiceTransformFailed(format!("GET {url}: {e}")))?;
            let mut file = File::create(&partial).map_err(|e| PipelineError::io(&partial, e))?;
            response
                .copy_to(&mut file)
                .map_err(|e| PipelineError::VoiceTransformFailed(format!("GET {url}: {e}")))?;
            file.flush().map_err(|e| PipelineError::io(&partial, e))?;
            std::fs::rename(&partial, dest).map_err(|e| PipelineError::io(dest, e))?;
            Ok(())
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        result
    }
}

impl VoiceTransformer for ReplicateTransformer {
    fn transform(
        &self,
        request: &TransformRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<(), PipelineError> {
        let model_uri = model_reference(request.voice_model)?;
        let token = self.token()?;
        cancel.check()?;

        let audio_uri = data_uri("audio/wav", request.input_path)?;
        let input = self.prediction_input(&audio_uri, request.pitch_shift, &model_uri);
        let prediction = self.submit(input, token)?;
        info!(
            prediction = prediction.id.as_deref().unwrap_or("?"),
            status = %prediction.status,
            "submitted voice transform"
        );

        let output = self.wait_for_output(prediction, token, cancel)?;
        cancel.check()?;
        self.download(output.url(), request.output_path)
    }
}

/// Resolve the voice model reference to something the service can fetch:
/// URLs pass through, local archives are inlined.
pub fn model_reference(voice_model: &str) -> Result<String, PipelineError> {
    let voice_model = voice_model.trim();
    if voice_model.is_empty() {
        return Err(PipelineError::MissingVoiceModel);
    }
    if voice_model.starts_with("http://")
        || voice_model.starts_with("https://")
        || voice_model.starts_with("data:")
    {
        return Ok(voice_model.to_string());
    }
    let path = Path::new(voice_model);
    if !path.is_file() {
        return Err(PipelineError::InvalidInput(format!(
            "voice model {voice_model} is neither a URL nor an existing file"
        )));
    }
    data_uri("application/zip", path)
}

fn data_uri(mime: &str, path: &Path) -> Result<String, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
