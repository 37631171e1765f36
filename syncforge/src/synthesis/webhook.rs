//! Webhook payload shape for out-of-band completion callbacks.
//!
//! The pipeline persists `synth_request_id` before the first poll attempt, so
//! a callback arriving early can always locate its chunk via
//! `ChunkRepository::find_by_request_id`. A poll completing after the webhook
//! has already written the chunk is a benign duplicate.

use serde::Deserialize;

use super::extract_video_url;

/// Callback body. Gateways disagree on the id field name, so both are
/// accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(alias = "gateway_request_id")]
    pub request_id: String,
    pub status: Option<String>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl WebhookPayload {
    /// Whether the callback reports terminal success.
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("COMPLETED")
    }

    /// Output video URL carried in the callback body, if any.
    pub fn video_url(&self) -> Option<String> {
        extract_video_url(&self.payload)
    }
}
