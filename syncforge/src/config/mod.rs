//! Process-wide configuration, loaded once at startup from the environment.

use crate::{Error, Result};

/// Signed URL lifetime used for every signed URL the service issues.
pub const SIGNED_URL_TTL_SECS: u64 = 3600;

/// Default scheduler capacity when `system_config` has no override.
pub const DEFAULT_MAX_CONCURRENT_JOBS: u32 = 3;

/// Immutable application configuration.
///
/// Credentials and endpoints are resolved once in `main` and shared behind an
/// `Arc`; nothing mutates this after startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Object store endpoint (e.g. `https://project.storage.example.com`).
    pub storage_base_url: String,
    /// Privileged credential for object writes and signed URLs.
    pub storage_service_credential: String,
    /// Bucket holding inputs, outputs and previews.
    pub storage_bucket: String,
    /// Bearer credential for the synthesis service.
    pub synth_api_key: String,
    /// Synthesis service base URL.
    pub synth_api_base: String,
    /// Synthesis model identifier appended to the base URL.
    pub synth_model_id: String,
    /// Submission endpoint path under the model.
    pub synth_endpoint: String,
    /// Webhook callback URL passed to the synthesis service, if any.
    pub synth_webhook_url: Option<String>,
    /// Shared secret gating the analyzer endpoint. None disables the gate.
    pub webhook_shared_secret: Option<String>,
    /// Comma-separated CORS allow-list. Empty means wildcard.
    pub cors_origins: Vec<String>,
    /// Trial-tier logo overlay asset.
    pub watermark_url: Option<String>,
    /// SQLite database URL.
    pub database_url: String,
    /// API bind address.
    pub api_bind_address: String,
    /// API port.
    pub api_port: u16,
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(var: &str) -> Result<String> {
    non_empty(var).ok_or_else(|| Error::config(format!("{} is not set", var)))
}

impl AppConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let cors_origins = non_empty("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            storage_base_url: required("STORAGE_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            storage_service_credential: required("STORAGE_SERVICE_CREDENTIAL")?,
            storage_bucket: non_empty("STORAGE_BUCKET").unwrap_or_else(|| "syncforge".to_string()),
            synth_api_key: required("SYNTH_API_KEY")?,
            synth_api_base: required("SYNTH_API_BASE")?.trim_end_matches('/').to_string(),
            synth_model_id: non_empty("SYNTH_MODEL_ID")
                .unwrap_or_else(|| "motion-control-v2".to_string()),
            synth_endpoint: non_empty("SYNTH_ENDPOINT").unwrap_or_default(),
            synth_webhook_url: non_empty("SYNTH_WEBHOOK_URL"),
            webhook_shared_secret: non_empty("WEBHOOK_SHARED_SECRET"),
            cors_origins,
            watermark_url: non_empty("WATERMARK_URL"),
            database_url: non_empty("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:syncforge.db?mode=rwc".to_string()),
            api_bind_address: non_empty("API_BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            api_port: non_empty("API_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_parsing() {
        let raw = "https://app.example.com, https://studio.example.com ,";
        let origins: Vec<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://app.example.com");
    }
}
