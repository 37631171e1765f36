//! Synthesis service client: single-shot submission, status polling with a
//! result-endpoint fallback, and result extraction.

pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Maximum prompt length in code points, applied after trimming.
pub const MAX_PROMPT_LEN: usize = 100;

/// A single synthesis submission.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub driver_video_url: String,
    pub target_image_url: String,
    pub prompt: Option<String>,
}

/// Status reported by the queue-based synthesis service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisStatus {
    InQueue,
    InProgress,
    Completed,
    Failed { error: Option<String> },
}

/// Synthesis client capability set.
#[async_trait]
pub trait SynthesisClient: Send + Sync {
    /// Submit a request; returns the service's request id.
    async fn submit(&self, request: &SynthesisRequest) -> Result<String>;
    /// One status observation.
    async fn poll_status(&self, request_id: &str) -> Result<SynthesisStatus>;
    /// Fetch the result object; returns the output video URL if present.
    async fn fetch_result(&self, request_id: &str) -> Result<Option<String>>;
}

/// Polling parameters. Defaults give the 5-minute ceiling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
    pub transport_error_threshold: u32,
    pub min_attempts_before_fallback: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
            transport_error_threshold: 10,
            min_attempts_before_fallback: 5,
        }
    }
}

/// Clamp a prompt to [`MAX_PROMPT_LEN`] code points after trimming. Empty
/// prompts collapse to None.
pub fn clamp_prompt(prompt: Option<&str>) -> Option<String> {
    let trimmed = prompt?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_PROMPT_LEN).collect())
}

/// Extract the output video URL from a result object. Both response shapes
/// are accepted: `response.video.url` and `video.url`.
pub fn extract_video_url(result: &serde_json::Value) -> Option<String> {
    result
        .pointer("/response/video/url")
        .or_else(|| result.pointer("/video/url"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Drive a submitted request to completion.
///
/// Polls every `interval` for up to `max_attempts`. Transport errors count
/// toward a threshold; once past it AND the minimum attempt count has
/// elapsed, the result endpoint is additionally tried each attempt, since it
/// may already hold the result while the status endpoint misbehaves.
pub async fn poll_until_complete(
    client: &dyn SynthesisClient,
    request_id: &str,
    config: &PollConfig,
) -> Result<String> {
    let mut transport_errors = 0u32;

    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.interval).await;

        match client.poll_status(request_id).await {
            Ok(SynthesisStatus::Completed) => {
                let url = client.fetch_result(request_id).await?.ok_or_else(|| {
                    Error::external(format!("No video URL in result for {}", request_id))
                })?;
                return Ok(url);
            }
            Ok(SynthesisStatus::Failed { error }) => {
                return Err(Error::external(format!(
                    "Synthesis failed for {}: {}",
                    request_id,
                    error.as_deref().unwrap_or("unknown error")
                )));
            }
            Ok(status) => {
                debug!(request_id, attempt, ?status, "Synthesis still running");
            }
            Err(e) => {
                transport_errors += 1;
                warn!(
                    request_id,
                    attempt, transport_errors, "Status poll failed: {}", e
                );
            }
        }

        // Status endpoint misbehaving: the result may already be there.
        if transport_errors >= config.transport_error_threshold
            && attempt >= config.min_attempts_before_fallback
            && let Ok(Some(url)) = client.fetch_result(request_id).await
        {
            warn!(request_id, "Recovered result via direct fetch");
            return Ok(url);
        }
    }

    Err(Error::Timeout(format!(
        "Synthesis polling exhausted after {} attempts for {}",
        config.max_attempts, request_id
    )))
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    error: Option<String>,
}

/// HTTP client for the external motion-control service.
pub struct MotionControlClient {
    client: reqwest::Client,
    api_base: String,
    model_id: String,
    endpoint: String,
    api_key: String,
    webhook_url: Option<String>,
}

impl MotionControlClient {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        model_id: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        webhook_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            webhook_url,
        }
    }

    fn submit_url(&self) -> String {
        format!("{}/{}{}", self.api_base, self.model_id, self.endpoint)
    }

    fn status_url(&self, request_id: &str) -> String {
        format!(
            "{}/{}/requests/{}/status",
            self.api_base, self.model_id, request_id
        )
    }

    fn result_url(&self, request_id: &str) -> String {
        format!("{}/{}/requests/{}", self.api_base, self.model_id, request_id)
    }
}

#[async_trait]
impl SynthesisClient for MotionControlClient {
    async fn submit(&self, request: &SynthesisRequest) -> Result<String> {
        let mut body = serde_json::json!({
            "driver_video_url": request.driver_video_url,
            "target_image_url": request.target_image_url,
        });
        if let Some(prompt) = clamp_prompt(request.prompt.as_deref()) {
            body["prompt"] = serde_json::Value::String(prompt);
        }

        // Webhook callback rides as a query parameter, never in the body.
        let mut req = self
            .client
            .post(self.submit_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(Duration::from_secs(60));
        if let Some(webhook_url) = &self.webhook_url {
            req = req.query(&[("webhook_url", webhook_url)]);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::external(format!("Synthesis submit failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::external(format!(
                "Synthesis submit rejected: HTTP {}: {}",
                status,
                crate::error::truncate_message(&body)
            )));
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::external(format!("Synthesis submit response invalid: {}", e)))?;
        Ok(parsed.request_id)
    }

    async fn poll_status(&self, request_id: &str) -> Result<SynthesisStatus> {
        let response = self
            .client
            .get(self.status_url(request_id))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Error::external(format!("Status request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::external(format!(
                "Status endpoint returned HTTP {}",
                status
            )));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| Error::external(format!("Status response invalid: {}", e)))?;

        match parsed.status.as_str() {
            "IN_QUEUE" => Ok(SynthesisStatus::InQueue),
            "IN_PROGRESS" => Ok(SynthesisStatus::InProgress),
            "COMPLETED" => Ok(SynthesisStatus::Completed),
            "FAILED" => Ok(SynthesisStatus::Failed {
                error: parsed.error,
            }),
            other => Err(Error::external(format!(
                "Unexpected synthesis status: {}",
                other
            ))),
        }
    }

    async fn fetch_result(&self, request_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.result_url(request_id))
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| Error::external(format!("Result request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::external(format!(
                "Result endpoint returned HTTP {}",
                response.status()
            )));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::external(format!("Result response invalid: {}", e)))?;
        Ok(extract_video_url(&value))
    }
}
