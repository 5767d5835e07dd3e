use crate::config::LlmConfig;
use crate::types::{PulseError, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Thin client for a Gemini-style `generateContent` REST endpoint.
///
/// Calls are retried a bounded number of times with exponential backoff
/// before the error propagates to the calling stage.
pub struct GeminiClient {
    client: reqwest::Client,
    config: LlmConfig,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            config,
            max_retries: 2,
        })
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.3, "topP": 0.8 },
        });

        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..ExponentialBackoff::default()
        };
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.try_generate(&url, &body).await {
                Ok(text) => {
                    debug!("LLM returned {} characters", text.len());
                    return Ok(text);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "LLM call failed (attempt {}), retrying in {:?}",
                                attempt + 1,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PulseError::BadResponse("LLM call never attempted".into())))
    }

    async fn try_generate(&self, url: &str, body: &serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::BadResponse(format!(
                "LLM endpoint returned HTTP {status}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| PulseError::BadResponse("empty LLM response".into()))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

/// Slice out the first `{...}` block from model output that may be wrapped
/// in prose or code fences.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Slice out the first `[...]` block from model output.
pub(crate) fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
