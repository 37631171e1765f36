//! Preview endpoint: run the analyzer inline and emit per-chunk signed URLs
//! for a dry-run display, without touching the synthesis service.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::analyze::require_http_url;
use crate::analysis::AnalysisReport;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::config::SIGNED_URL_TTL_SECS;
use crate::storage::paths;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub video_url: Option<String>,
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    pub generation_id: Option<String>,
    pub bpm: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct PreviewChunk {
    pub chunk_index: u32,
    pub video_chunk_url: String,
    pub audio_chunk_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_index: Option<usize>,
    pub video_start_time: f64,
    pub video_end_time: f64,
    pub audio_start_time: f64,
    pub audio_end_time: f64,
}

#[derive(Debug, Serialize)]
pub struct PreviewAnalysis {
    pub bpm: f64,
    pub sync_offset: f64,
    pub chunk_duration: f64,
    pub onset_detection: crate::analysis::OnsetDiagnostics,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub video_duration: f64,
    pub audio_duration: f64,
    pub num_chunks: u32,
    pub chunks: Vec<PreviewChunk>,
    pub analysis: PreviewAnalysis,
}

/// Timing for one preview chunk over the RAW assets (the dry run applies no
/// pre-trim, so the audio grid carries the offset explicitly).
pub(crate) fn preview_timing(
    index: u32,
    chunk_duration: f64,
    sync_offset: f64,
    video_duration: f64,
) -> (f64, f64, f64, f64) {
    let video_start = index as f64 * chunk_duration;
    let video_end = (video_start + chunk_duration).min(video_duration);
    let audio_start = video_start + sync_offset;
    let audio_end = audio_start + chunk_duration;
    (video_start, video_end, audio_start, audio_end)
}

/// Preview endpoint.
pub async fn preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<Json<PreviewResponse>> {
    let video_url = require_http_url(request.video_url.as_deref(), "video_url")?;
    let audio_url = require_http_url(request.audio_url.as_deref(), "audio_url")?;

    let workdir = tempfile::tempdir().map_err(|e| ApiError::internal(e.to_string()))?;
    let video_path = workdir.path().join("video.mp4");
    let audio_download = workdir.path().join("audio_download");
    let video_audio_path = workdir.path().join("video_audio.wav");

    state
        .fetcher
        .fetch(&video_url, &video_path)
        .await
        .map_err(ApiError::from)?;
    state
        .fetcher
        .fetch(&audio_url, &audio_download)
        .await
        .map_err(ApiError::from)?;

    let audio_path = workdir.path().join("audio.wav");
    if crate::analysis::has_wav_extension(&audio_url) {
        tokio::fs::rename(&audio_download, &audio_path)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
    } else {
        state
            .media
            .transcode_to_wav(&audio_download, &audio_path)
            .await
            .map_err(ApiError::from)?;
    }

    state
        .media
        .extract_alignment_track(&video_path, &video_audio_path)
        .await
        .map_err(ApiError::from)?;

    let report: AnalysisReport = state
        .analyzer
        .compute_report(&audio_path, &video_audio_path, request.bpm)
        .await
        .map_err(ApiError::from)?;

    let video_duration = state
        .media
        .probe_duration(&video_path)
        .await
        .map_err(ApiError::from)?;
    let audio_duration = state
        .media
        .probe_duration(&audio_path)
        .await
        .map_err(ApiError::from)?;

    let num_chunks = (video_duration / report.chunk_duration).ceil().max(1.0) as u32;
    info!(
        video_duration,
        audio_duration, num_chunks, "Generating chunk previews"
    );

    // A unique suffix keeps repeated previews of one generation from
    // colliding in storage.
    let owner = request.generation_id.as_deref().unwrap_or("temp");
    let unique = uuid::Uuid::new_v4().to_string();
    let prefix = paths::preview_prefix(owner, &unique);

    let chunks_dir = workdir.path().join("chunks");
    tokio::fs::create_dir_all(&chunks_dir)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut chunks = Vec::with_capacity(num_chunks as usize);
    for index in 0..num_chunks {
        let (video_start, video_end, audio_start, audio_end) = preview_timing(
            index,
            report.chunk_duration,
            report.sync_offset,
            video_duration,
        );

        let video_chunk = chunks_dir.join(format!("video_chunk_{:03}.mp4", index));
        state
            .media
            .slice_video_copy(&video_path, &video_chunk, video_start, video_end - video_start)
            .await
            .map_err(ApiError::from)?;

        let audio_chunk = chunks_dir.join(format!("audio_chunk_{:03}.wav", index));
        state
            .media
            .extract_audio_slice(&audio_path, &audio_chunk, audio_start, report.chunk_duration)
            .await
            .map_err(ApiError::from)?;

        let video_key = format!("{}/video_chunk_{:03}.mp4", prefix, index);
        let video_bytes = tokio::fs::read(&video_chunk)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        state
            .storage
            .upload(&video_key, video_bytes, "video/mp4")
            .await
            .map_err(ApiError::from)?;

        let audio_key = format!("{}/audio_chunk_{:03}.wav", prefix, index);
        let audio_bytes = tokio::fs::read(&audio_chunk)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        state
            .storage
            .upload(&audio_key, audio_bytes, "audio/wav")
            .await
            .map_err(ApiError::from)?;

        let video_chunk_url = state
            .storage
            .create_signed_url(&video_key, SIGNED_URL_TTL_SECS)
            .await
            .map_err(ApiError::from)?;
        let audio_chunk_url = state
            .storage
            .create_signed_url(&audio_key, SIGNED_URL_TTL_SECS)
            .await
            .map_err(ApiError::from)?;

        let (image_url, image_index) = if request.image_urls.is_empty() {
            (None, None)
        } else {
            let image_index = index as usize % request.image_urls.len();
            (Some(request.image_urls[image_index].clone()), Some(image_index))
        };

        chunks.push(PreviewChunk {
            chunk_index: index,
            video_chunk_url,
            audio_chunk_url,
            image_url,
            image_index,
            video_start_time: video_start,
            video_end_time: video_end,
            audio_start_time: audio_start,
            audio_end_time: audio_end,
        });
    }

    Ok(Json(PreviewResponse {
        video_duration,
        audio_duration,
        num_chunks,
        chunks,
        analysis: PreviewAnalysis {
            bpm: report.bpm,
            sync_offset: report.sync_offset,
            chunk_duration: report.chunk_duration,
            onset_detection: report.onset_detection,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_timing_carries_raw_offset() {
        // Positive offset: the audio window leads the raw grid.
        let (vs, ve, as_, ae) = preview_timing(1, 8.0, 2.0, 18.0);
        assert_eq!(vs, 8.0);
        assert_eq!(ve, 16.0);
        assert_eq!(as_, 10.0);
        assert_eq!(ae, 18.0);

        // Final chunk clamps to the video duration.
        let (vs, ve, _, _) = preview_timing(2, 8.0, 2.0, 18.0);
        assert_eq!(vs, 16.0);
        assert_eq!(ve, 18.0);

        // Negative offset shifts the audio window back.
        let (_, _, as_, ae) = preview_timing(0, 8.0, -4.0, 10.0);
        assert_eq!(as_, -4.0);
        assert_eq!(ae, 4.0);
    }
}
