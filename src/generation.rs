//! Text generation provider abstraction.
//!
//! Defines the [`Generator`] trait used by the chat orchestrator and two
//! implementations: [`OpenAiGenerator`] for OpenAI-compatible chat APIs and
//! [`DisabledGenerator`] for configurations without a generation backend.
//!
//! The retry policy matches the embedding provider: 429/5xx and network
//! errors back off exponentially, other client errors fail immediately.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;

/// A generation backend. Takes a system instruction and a user prompt,
/// returns the generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// A no-op generation provider that always returns errors.
///
/// Chat requests against it surface a backend-unavailable failure instead of
/// silently answering ungrounded.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled")
    }
}

/// Generation provider for OpenAI-compatible chat APIs.
///
/// Calls `POST {base_url}/v1/chat/completions` with a system and a user
/// message. The API key is read from the environment variable named by
/// `generation.api_key_env`.
pub struct OpenAiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generation.model required for OpenAI provider"))?;
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt },
            ],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Chat completions API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Chat completions API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Generation failed after retries")))
    }
}

/// Extract `choices[0].message.content` from a chat completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completions response: missing content"))
}

/// Create the [`Generator`] named by the configuration.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_generator_errors() {
        let result = DisabledGenerator.complete("system", "prompt").await;
        assert!(result.is_err());
    }

    #[test]
    fn completion_response_parsing() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "grounded answer" } }
            ]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "grounded answer");

        let bad = serde_json::json!({ "choices": [] });
        assert!(parse_completion_response(&bad).is_err());
    }

    #[test]
    fn factory_rejects_unknown_provider() {
        let mut config = GenerationConfig::default();
        config.provider = "mystery".to_string();
        assert!(create_generator(&config).is_err());
    }
}
