//! Transcription provider abstraction.
//!
//! Voice memos are captured as WAV bytes by the recorder and handed to a
//! [`Transcriber`]. [`OpenAiTranscriber`] uploads them to an
//! OpenAI-compatible `/v1/audio/transcriptions` endpoint (multipart form);
//! [`DisabledTranscriber`] rejects, for configurations without a speech
//! backend.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TranscriptionConfig;

/// A speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn model_name(&self) -> &str;
    async fn transcribe(&self, audio_wav: &[u8]) -> Result<String>;
}

/// A no-op transcription provider that always returns errors.
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn transcribe(&self, _audio_wav: &[u8]) -> Result<String> {
        bail!("Transcription provider is disabled")
    }
}

/// Transcription provider for OpenAI-compatible audio APIs.
///
/// Uploads captured audio as `multipart/form-data` to
/// `POST {base_url}/v1/audio/transcriptions`. Transient failures (429/5xx,
/// network) are retried with the same backoff schedule as the other
/// providers; the form is rebuilt per attempt since multipart bodies are
/// consumed on send.
pub struct OpenAiTranscriber {
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

const TRANSCRIBE_RETRIES: u32 = 2;

impl OpenAiTranscriber {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("transcription.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn build_form(&self, audio_wav: &[u8]) -> Result<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(audio_wav.to_vec())
            .file_name("memo.wav")
            .mime_str("audio/wav")?;
        Ok(reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part))
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio_wav: &[u8]) -> Result<String> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);

        let mut last_err = None;

        for attempt in 0..=TRANSCRIBE_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .multipart(self.build_form(audio_wav)?)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return json
                            .get("text")
                            .and_then(|t| t.as_str())
                            .map(|s| s.to_string())
                            .ok_or_else(|| {
                                anyhow::anyhow!("Invalid transcription response: missing text")
                            });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Transcription API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Transcription API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Transcription failed after retries")))
    }
}

/// Create the [`Transcriber`] named by the configuration.
pub fn create_transcriber(config: &TranscriptionConfig) -> Result<Arc<dyn Transcriber>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledTranscriber)),
        "openai" => Ok(Arc::new(OpenAiTranscriber::new(config)?)),
        other => bail!("Unknown transcription provider: {}", other),
    }
}
