//! Job row model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{AnalysisStatus, JobStatus, Tier};
use crate::{Error, Result};

/// Job row. One asynchronous production run over a (video, audio, images)
/// triple.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobDbModel {
    pub id: String,
    /// Tier: demo, label, artist, open_mic, industry.
    pub tier: String,
    pub is_first_time: bool,
    pub user_video_url: String,
    pub master_audio_url: String,
    /// JSON array of target image URLs, at least one element.
    pub target_images: String,
    /// Optional scene prompt, at most 100 code points after trimming.
    pub prompt: Option<String>,
    /// Optional user-declared tempo (1-300).
    pub user_bpm: Option<f64>,
    pub generation_id: Option<String>,
    // Analysis outputs, null until analyzed.
    pub sync_offset: Option<f64>,
    pub bpm: Option<f64>,
    pub chunk_duration: Option<f64>,
    /// PENDING_ANALYSIS, ANALYZING, ANALYZED, FAILED.
    pub analysis_status: String,
    /// PENDING, PROCESSING, COMPLETED, FAILED.
    pub status: String,
    pub output_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl JobDbModel {
    /// Create a new pending job.
    pub fn new(
        tier: Tier,
        user_video_url: impl Into<String>,
        master_audio_url: impl Into<String>,
        target_images: &[String],
        generation_id: Option<String>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tier: tier.as_str().to_string(),
            is_first_time: false,
            user_video_url: user_video_url.into(),
            master_audio_url: master_audio_url.into(),
            target_images: serde_json::to_string(target_images).unwrap_or_else(|_| "[]".into()),
            prompt: None,
            user_bpm: None,
            generation_id,
            sync_offset: None,
            bpm: None,
            chunk_duration: None,
            analysis_status: AnalysisStatus::PendingAnalysis.as_str().to_string(),
            status: JobStatus::Pending.as_str().to_string(),
            output_url: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_user_bpm(mut self, bpm: f64) -> Self {
        self.user_bpm = Some(bpm);
        self
    }

    pub fn with_first_time(mut self, first_time: bool) -> Self {
        self.is_first_time = first_time;
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    pub fn tier(&self) -> Result<Tier> {
        Tier::parse(&self.tier)
    }

    pub fn status(&self) -> Result<JobStatus> {
        JobStatus::parse(&self.status)
    }

    pub fn analysis_status(&self) -> Result<AnalysisStatus> {
        AnalysisStatus::parse(&self.analysis_status)
    }

    /// Parse the stored target image list. Must be non-empty.
    pub fn target_images(&self) -> Result<Vec<String>> {
        let images: Vec<String> = serde_json::from_str(&self.target_images)?;
        if images.is_empty() {
            return Err(Error::validation("No target images provided"));
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_defaults() {
        let images = vec!["https://cdn.example.com/a.jpg".to_string()];
        let job = JobDbModel::new(
            Tier::Demo,
            "https://cdn.example.com/v.mp4",
            "https://cdn.example.com/a.wav",
            &images,
            Some("gen-1".into()),
        );

        assert_eq!(job.status().unwrap(), JobStatus::Pending);
        assert_eq!(
            job.analysis_status().unwrap(),
            AnalysisStatus::PendingAnalysis
        );
        assert_eq!(job.target_images().unwrap(), images);
        assert!(!job.is_first_time);
    }

    #[test]
    fn test_empty_target_images_rejected() {
        let mut job = JobDbModel::new(Tier::Label, "v", "a", &[], None);
        job.target_images = "[]".to_string();
        assert!(job.target_images().is_err());
    }
}
