//! Client for the hosted prediction API used by the Whisper, Canary-Qwen and WhisperX backends.

use crate::config::ReplicateSettings;
use crate::error::{PodtekstError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Minimal prediction API client: create a prediction, then poll until it settles.
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

impl ReplicateClient {
    /// Build a client from settings, reading the API token from `REPLICATE_API_TOKEN`.
    pub fn from_settings(settings: &ReplicateSettings) -> Result<Self> {
        let token = std::env::var("REPLICATE_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());
        Self::new(settings, token)
    }

    /// Build a client with an explicit token.
    pub fn new(settings: &ReplicateSettings, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            http,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            token,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            timeout: Duration::from_secs(settings.timeout_seconds),
        })
    }

    /// Run a model version with the given input and return its output.
    ///
    /// `version` may be `owner/model:hash` or just the hash.
    #[instrument(skip(self, input))]
    pub async fn run(&self, version: &str, input: Value) -> Result<Value> {
        let token = self.token.as_deref().ok_or_else(|| {
            PodtekstError::Recognition(
                "REPLICATE_API_TOKEN not set. Set it with: export REPLICATE_API_TOKEN='r8_...'"
                    .to_string(),
            )
        })?;

        let version_id = version_hash(version);
        let started = Instant::now();

        let mut prediction: Prediction = self
            .http
            .post(format!("{}/predictions", self.api_base))
            .bearer_auth(token)
            .header("Prefer", "wait")
            .json(&json!({ "version": version_id, "input": input }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PodtekstError::Recognition(format!("Failed to start prediction: {}", e)))?
            .json()
            .await
            .map_err(|e| PodtekstError::Recognition(format!("Invalid prediction response: {}", e)))?;

        info!("Prediction {} started ({})", prediction.id, prediction.status);

        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    debug!("Prediction {} succeeded after {:?}", prediction.id, started.elapsed());
                    return Ok(prediction.output.unwrap_or(Value::Null));
                }
                "failed" | "canceled" => {
                    let reason = prediction
                        .error
                        .map(|e| match e {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .unwrap_or_else(|| "no error message".to_string());
                    return Err(PodtekstError::Recognition(format!(
                        "Prediction {} {}: {}",
                        prediction.id, prediction.status, reason
                    )));
                }
                _ => {}
            }

            if started.elapsed() > self.timeout {
                return Err(PodtekstError::Recognition(format!(
                    "Prediction {} did not finish within {}s",
                    prediction.id,
                    self.timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.poll_interval).await;

            let poll_url = prediction
                .urls
                .as_ref()
                .map(|u| u.get.clone())
                .unwrap_or_else(|| format!("{}/predictions/{}", self.api_base, prediction.id));

            prediction = self
                .http
                .get(&poll_url)
                .bearer_auth(token)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| PodtekstError::Recognition(format!("Failed to poll prediction: {}", e)))?
                .json()
                .await
                .map_err(|e| {
                    PodtekstError::Recognition(format!("Invalid prediction response: {}", e))
                })?;
        }
    }
}

/// Strip an `owner/model:` prefix from a version reference.
fn version_hash(version: &str) -> &str {
    version.rsplit_once(':').map(|(_, hash)| hash).unwrap_or(version)
}
