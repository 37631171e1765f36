//! Chunk row model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::ChunkStatus;
use crate::Result;

/// Chunk row. One whole-measure-aligned span of the aligned video/audio pair.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ChunkDbModel {
    pub id: String,
    pub job_id: String,
    pub generation_id: Option<String>,
    pub chunk_index: i64,
    /// PENDING, PROCESSING, COMPLETED, FAILED.
    pub status: String,
    pub video_chunk_start_time: Option<f64>,
    pub video_chunk_end_time: Option<f64>,
    pub audio_start_time: Option<f64>,
    pub chunk_duration: Option<f64>,
    /// Copied from the job at planning time.
    pub sync_offset: Option<f64>,
    /// External request id. Persisted before the poll loop starts so a
    /// webhook arriving first can locate the chunk.
    pub synth_request_id: Option<String>,
    pub synth_requested_at: Option<String>,
    pub synth_completed_at: Option<String>,
    /// Raw output URL on the synthesis service.
    pub synth_video_url: Option<String>,
    /// Signed URL of the muxed segment in object storage. Never the raw
    /// synthesis URL.
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub image_index: Option<i64>,
    pub credits_charged: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChunkDbModel {
    /// Create a pending chunk for `job_id` at `chunk_index`.
    pub fn new(job_id: impl Into<String>, generation_id: Option<String>, chunk_index: u32) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.into(),
            generation_id,
            chunk_index: chunk_index as i64,
            status: ChunkStatus::Pending.as_str().to_string(),
            video_chunk_start_time: None,
            video_chunk_end_time: None,
            audio_start_time: None,
            chunk_duration: None,
            sync_offset: None,
            synth_request_id: None,
            synth_requested_at: None,
            synth_completed_at: None,
            synth_video_url: None,
            video_url: None,
            image_url: None,
            image_index: None,
            credits_charged: 0,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_timing(
        mut self,
        video_start: f64,
        video_end: f64,
        audio_start: f64,
        duration: f64,
        sync_offset: f64,
    ) -> Self {
        self.video_chunk_start_time = Some(video_start);
        self.video_chunk_end_time = Some(video_end);
        self.audio_start_time = Some(audio_start);
        self.chunk_duration = Some(duration);
        self.sync_offset = Some(sync_offset);
        self
    }

    pub fn status(&self) -> Result<ChunkStatus> {
        ChunkStatus::parse(&self.status)
    }
}

/// Full observability snapshot written when a chunk finishes successfully.
#[derive(Debug, Clone)]
pub struct ChunkCompletion {
    pub chunk_id: String,
    /// Signed URL of the muxed segment in the outputs namespace.
    pub video_url: String,
    /// Raw output URL on the synthesis service.
    pub synth_video_url: String,
    pub synth_completed_at: String,
    pub image_url: String,
    pub image_index: i64,
    pub credits_charged: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_chunk_is_pending() {
        let chunk = ChunkDbModel::new("job-1", Some("gen-1".into()), 2);
        assert_eq!(chunk.status().unwrap(), ChunkStatus::Pending);
        assert_eq!(chunk.chunk_index, 2);
        assert_eq!(chunk.credits_charged, 0);
        assert!(chunk.synth_request_id.is_none());
    }

    #[test]
    fn test_timing_builder() {
        let chunk = ChunkDbModel::new("job-1", None, 1).with_timing(8.0, 16.0, 8.0, 8.0, 2.0);
        assert_eq!(chunk.video_chunk_start_time, Some(8.0));
        assert_eq!(chunk.audio_start_time, Some(8.0));
        assert_eq!(chunk.sync_offset, Some(2.0));
    }
}
