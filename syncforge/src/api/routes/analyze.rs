//! Analyzer endpoint: POST / with `{video, audio, [job_id], [bpm]}`.

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::analysis::OnsetDiagnostics;

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub video: Option<String>,
    pub audio: Option<String>,
    pub job_id: Option<String>,
    /// Accepts numbers and numeric strings; non-numeric values are ignored
    /// and the tempo is estimated instead.
    pub bpm: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeDiagnostics {
    pub bpm: f64,
    pub sync_offset: f64,
    pub chunk_duration: f64,
    pub correlation_strength: f64,
    pub estimated_bpm: f64,
    pub onset_detection: OnsetDiagnostics,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub sync_offset: f64,
    pub bpm: f64,
    pub chunk_duration: f64,
    pub analysis: AnalyzeDiagnostics,
}

pub(crate) fn check_bearer(
    headers: &HeaderMap,
    shared_secret: Option<&str>,
) -> Result<(), ApiError> {
    let Some(secret) = shared_secret else {
        return Ok(());
    };
    let expected = format!("Bearer {}", secret);
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return Err(ApiError::unauthorized("Unauthorized - invalid API key"));
    }
    Ok(())
}

pub(crate) fn require_http_url(url: Option<&str>, field: &str) -> Result<String, ApiError> {
    let url =
        url.ok_or_else(|| ApiError::bad_request(format!("Missing required field: {}", field)))?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::bad_request(format!(
            "Invalid {} URL format",
            field
        )));
    }
    Ok(url.to_string())
}

/// Interpret the request's `bpm`: numbers and numeric strings are range
/// checked (1-300 -> 400 outside), anything unparsable falls back to the
/// library estimate.
pub(crate) fn parse_user_bpm(raw: Option<&serde_json::Value>) -> Result<Option<f64>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let numeric = match raw {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        serde_json::Value::Null => return Ok(None),
        _ => None,
    };

    match numeric {
        Some(bpm) => {
            if bpm <= 0.0 || bpm > 300.0 {
                return Err(ApiError::bad_request("BPM must be between 1 and 300"));
            }
            Ok(Some(bpm))
        }
        None => {
            warn!(?raw, "Unparsable bpm value; estimating tempo instead");
            Ok(None)
        }
    }
}

/// Analyzer endpoint.
pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    check_bearer(&headers, state.webhook_shared_secret.as_deref())?;

    let video_url = require_http_url(request.video.as_deref(), "video")?;
    let audio_url = require_http_url(request.audio.as_deref(), "audio")?;
    let user_bpm = parse_user_bpm(request.bpm.as_ref())?;

    let report = state
        .analyzer
        .analyze(request.job_id.as_deref(), &video_url, &audio_url, user_bpm)
        .await
        .map_err(|e| {
            // The analyzer has already recorded FAILED on the job row.
            ApiError::from(e).with_job_id(request.job_id.clone())
        })?;

    Ok(Json(AnalyzeResponse {
        status: "Analysis Complete",
        job_id: request.job_id,
        sync_offset: report.sync_offset,
        bpm: report.bpm,
        chunk_duration: report.chunk_duration,
        analysis: AnalyzeDiagnostics {
            bpm: report.bpm,
            sync_offset: report.sync_offset,
            chunk_duration: report.chunk_duration,
            correlation_strength: report.correlation_strength,
            estimated_bpm: report.estimated_bpm,
            onset_detection: report.onset_detection,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_bearer_gate() {
        let mut headers = HeaderMap::new();
        assert!(check_bearer(&headers, None).is_ok());

        assert_eq!(
            check_bearer(&headers, Some("s3cret")).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer s3cret".parse().unwrap(),
        );
        assert!(check_bearer(&headers, Some("s3cret")).is_ok());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer wrong".parse().unwrap(),
        );
        assert!(check_bearer(&headers, Some("s3cret")).is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(require_http_url(None, "video").is_err());
        assert!(require_http_url(Some("ftp://x/video.mp4"), "video").is_err());
        assert!(require_http_url(Some("https://x/video.mp4"), "video").is_ok());
        assert!(require_http_url(Some("http://x/video.mp4"), "video").is_ok());
    }

    #[test]
    fn test_bpm_parsing() {
        assert_eq!(parse_user_bpm(None).unwrap(), None);
        assert_eq!(
            parse_user_bpm(Some(&serde_json::json!(120.0))).unwrap(),
            Some(120.0)
        );
        assert_eq!(
            parse_user_bpm(Some(&serde_json::json!("95"))).unwrap(),
            Some(95.0)
        );
        // Out of range is a client error, parsable or not.
        assert!(parse_user_bpm(Some(&serde_json::json!(0))).is_err());
        assert!(parse_user_bpm(Some(&serde_json::json!(301))).is_err());
        assert!(parse_user_bpm(Some(&serde_json::json!("999"))).is_err());
        // Garbage falls back to estimation.
        assert_eq!(
            parse_user_bpm(Some(&serde_json::json!("fast"))).unwrap(),
            None
        );
        assert_eq!(
            parse_user_bpm(Some(&serde_json::Value::Null)).unwrap(),
            None
        );
    }
}
