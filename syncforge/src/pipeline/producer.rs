//! The chunked production pipeline: smart pre-trim, chunk grid, per-chunk
//! synthesis, audio slicing, muxing and stitching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::plan::{ChunkPlan, ChunkSpan, plan_chunks};
use super::workspace::{FinalArtifact, JobWorkspace};
use crate::config::SIGNED_URL_TTL_SECS;
use crate::database::models::{ChunkCompletion, ChunkDbModel, JobDbModel};
use crate::database::repositories::{ChunkRepository, GenerationRepository, JobRepository};
use crate::domain::types::CHUNK_LIMIT_SECS;
use crate::domain::{AnalysisStatus, GenerationStage, GenerationStatus};
use crate::media::MediaRunner;
use crate::storage::{AssetFetcher, ObjectStorage, paths};
use crate::synthesis::{PollConfig, SynthesisClient, SynthesisRequest, poll_until_complete};
use crate::{Error, Result};

/// Offsets below this magnitude skip the pre-trim entirely.
const PRE_TRIM_EPSILON_SECS: f64 = 0.01;

/// Rough wall-clock estimate per chunk, for estimated_completion_at.
const ESTIMATED_SECS_PER_CHUNK: i64 = 75;

/// Everything the pipeline talks to. All shared, all behind traits.
#[derive(Clone)]
pub struct PipelineDeps {
    pub fetcher: Arc<dyn AssetFetcher>,
    pub media: Arc<dyn MediaRunner>,
    pub storage: Arc<dyn ObjectStorage>,
    pub synthesis: Arc<dyn SynthesisClient>,
    pub jobs: Arc<dyn JobRepository>,
    pub chunks: Arc<dyn ChunkRepository>,
    pub generations: Arc<dyn GenerationRepository>,
}

struct CompletedSegment {
    path: PathBuf,
    credits: i64,
}

/// Chunked production pipeline for one job.
pub struct ChunkedProducer {
    deps: PipelineDeps,
    poll_config: PollConfig,
}

impl ChunkedProducer {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps,
            poll_config: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll_config: PollConfig) -> Self {
        self.poll_config = poll_config;
        self
    }

    /// Run the job to a final artifact. The artifact keeps the job workspace
    /// alive until the caller has persisted the bytes elsewhere.
    pub async fn produce(&self, job: &JobDbModel) -> Result<FinalArtifact> {
        let tier = job.tier()?;
        let images = job.target_images()?;

        // Tempo-driven grid for analyzed tiers; the fixed ceiling otherwise.
        let chunk_duration = if tier.requires_analysis() {
            if job.analysis_status()? != AnalysisStatus::Analyzed {
                return Err(Error::validation(format!(
                    "Job {} dispatched before analysis completed",
                    job.id
                )));
            }
            job.chunk_duration
                .filter(|d| *d > 0.0)
                .ok_or_else(|| Error::validation("Analyzed job has no chunk duration"))?
        } else {
            job.chunk_duration
                .filter(|d| *d > 0.0)
                .unwrap_or(CHUNK_LIMIT_SECS)
        };

        let workspace = JobWorkspace::create()?;

        let video_download = workspace.file("user_video.mp4");
        let audio_download = workspace.file("audio_download");
        self.deps
            .fetcher
            .fetch(&job.user_video_url, &video_download)
            .await?;
        self.deps
            .fetcher
            .fetch(&job.master_audio_url, &audio_download)
            .await?;

        // Normalize the master to 44.1 kHz stereo PCM unless it is already a
        // WAV.
        let master_audio = workspace.file("master_audio.wav");
        if crate::analysis::has_wav_extension(&job.master_audio_url) {
            tokio::fs::rename(&audio_download, &master_audio).await?;
        } else {
            self.deps
                .media
                .transcode_to_wav(&audio_download, &master_audio)
                .await?;
        }

        let source_duration = self.deps.media.probe_duration(&video_download).await?;
        tier.validate_duration(source_duration)?;

        let sync_offset = job.sync_offset.unwrap_or(0.0);
        let (video_path, audio_path) = self
            .pre_trim(&workspace, video_download, master_audio, sync_offset)
            .await?;

        let aligned_duration = self.deps.media.probe_duration(&video_path).await?;
        let plan = plan_chunks(aligned_duration, chunk_duration)?;
        let n = plan.len() as u32;
        info!(
            job_id = %job.id,
            chunks = n,
            chunk_duration,
            sync_offset,
            aligned_duration,
            "Starting chunked production"
        );

        let owner = job.generation_id.clone().unwrap_or_else(|| job.id.clone());

        let mut rows = Vec::with_capacity(plan.len());
        for span in &plan.spans {
            let row = ChunkDbModel::new(&job.id, job.generation_id.clone(), span.index).with_timing(
                span.video_start,
                span.video_end,
                span.audio_start,
                span.duration,
                sync_offset,
            );
            self.deps.chunks.insert_chunk(&row).await?;
            rows.push(row);
        }

        if let Some(generation_id) = &job.generation_id {
            let estimate =
                Utc::now() + chrono::Duration::seconds(ESTIMATED_SECS_PER_CHUNK * n as i64);
            self.deps
                .generations
                .set_estimated_completion(generation_id, Some(&estimate.to_rfc3339()))
                .await?;
            self.deps
                .generations
                .update_progress(generation_id, GenerationStage::ProcessingChunks, 10)
                .await?;
        }

        let chunks_dir = workspace.chunks_dir()?;
        let mut segments: Vec<CompletedSegment> = Vec::new();

        for (span, row) in plan.spans.iter().zip(rows.iter()) {
            self.probe_cancellation(job).await?;

            self.deps.chunks.set_chunk_processing(&row.id).await?;
            if let Some(generation_id) = &job.generation_id {
                let progress = 10 + (80 * span.index / n) as u8;
                self.deps
                    .generations
                    .update_progress(generation_id, GenerationStage::ProcessingChunks, progress)
                    .await?;
            }

            match self
                .process_chunk(job, row, span, &plan, &images, &chunks_dir, &video_path, &audio_path, &owner)
                .await
            {
                Ok(segment) => {
                    info!(job_id = %job.id, chunk = span.index, "Chunk completed");
                    segments.push(segment);
                    if let Some(generation_id) = &job.generation_id {
                        let progress = 10 + (80 * (span.index + 1) / n) as u8;
                        self.deps
                            .generations
                            .update_progress(
                                generation_id,
                                GenerationStage::ProcessingChunks,
                                progress,
                            )
                            .await?;
                    }
                }
                Err(e) => {
                    // A chunk failure is localized: record it and move on.
                    warn!(job_id = %job.id, chunk = span.index, "Chunk failed: {}", e);
                    if let Err(db_err) = self
                        .deps
                        .chunks
                        .mark_chunk_failed(&row.id, &e.user_message())
                        .await
                    {
                        warn!(
                            chunk_id = %row.id,
                            "Failed to record chunk failure: {}", db_err
                        );
                    }
                }
            }
        }

        if segments.is_empty() {
            return Err(Error::Other("No chunks completed successfully".to_string()));
        }

        let cost_credits: i64 = segments.iter().map(|s| s.credits).sum();
        if let Some(generation_id) = &job.generation_id {
            self.deps
                .generations
                .set_cost_credits(generation_id, cost_credits)
                .await?;
            self.deps
                .generations
                .update_progress(generation_id, GenerationStage::Stitching, 90)
                .await?;
        }

        let final_path = workspace.file("final.mp4");
        if segments.len() == 1 {
            tokio::fs::copy(&segments[0].path, &final_path).await?;
        } else {
            let paths: Vec<PathBuf> = segments.iter().map(|s| s.path.clone()).collect();
            self.deps.media.concat_copy(&paths, &final_path).await?;
        }

        if let Some(generation_id) = &job.generation_id {
            self.deps
                .generations
                .update_progress(generation_id, GenerationStage::Finalizing, 95)
                .await?;
        }

        info!(job_id = %job.id, segments = segments.len(), cost_credits, "Production complete");
        Ok(FinalArtifact::new(final_path, workspace))
    }

    /// Cancellation probe at a chunk boundary. On observed cancellation every
    /// not-yet-completed chunk is swept FAILED with the distinguished error.
    async fn probe_cancellation(&self, job: &JobDbModel) -> Result<()> {
        let Some(generation_id) = &job.generation_id else {
            return Ok(());
        };

        if self.deps.generations.read_status(generation_id).await? == GenerationStatus::Cancelled {
            warn!(job_id = %job.id, %generation_id, "Generation cancelled; stopping");
            self.deps
                .chunks
                .fail_remaining_chunks(&job.id, "Cancelled by user")
                .await?;
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_chunk(
        &self,
        job: &JobDbModel,
        row: &ChunkDbModel,
        span: &ChunkSpan,
        plan: &ChunkPlan,
        images: &[String],
        chunks_dir: &Path,
        video_path: &Path,
        audio_path: &Path,
        owner: &str,
    ) -> Result<CompletedSegment> {
        // Video slice, re-encoded for frame accuracy.
        let chunk_path = chunks_dir.join(format!("chunk_{:03}.mp4", span.index));
        self.deps
            .media
            .slice_video_reencode(video_path, &chunk_path, span.video_start, span.duration)
            .await?;

        let metadata = tokio::fs::metadata(&chunk_path).await?;
        if metadata.len() == 0 {
            return Err(Error::media(format!(
                "Video slice {} is empty",
                span.index
            )));
        }
        if !self.deps.media.probe_has_video(&chunk_path).await? {
            return Err(Error::media(format!(
                "Video slice {} has no video stream",
                span.index
            )));
        }

        // Driver upload for the synthesis service.
        let driver_key = paths::chunk_driver_path(&job.id, span.index);
        let driver_bytes = tokio::fs::read(&chunk_path).await?;
        self.deps
            .storage
            .upload(&driver_key, driver_bytes, "video/mp4")
            .await?;
        let driver_url = self
            .deps
            .storage
            .create_signed_url(&driver_key, SIGNED_URL_TTL_SECS)
            .await?;

        let image_index = span.index as usize % images.len();
        let image_url = images[image_index].clone();

        let request = SynthesisRequest {
            driver_video_url: driver_url,
            target_image_url: image_url.clone(),
            prompt: job.prompt.clone(),
        };
        let request_id = self.deps.synthesis.submit(&request).await?;

        // The request id must be durable before the first poll so a webhook
        // arriving early can locate this chunk.
        self.deps
            .chunks
            .set_synth_request(&row.id, &request_id, &Utc::now().to_rfc3339())
            .await?;

        let synth_url =
            poll_until_complete(&*self.deps.synthesis, &request_id, &self.poll_config).await?;

        let synth_path = chunks_dir.join(format!("synth_{:03}.mp4", span.index));
        self.deps.fetcher.fetch(&synth_url, &synth_path).await?;

        // Slice the master by the actual slice length, covering a shorter
        // final chunk.
        let slice_len = self.deps.media.probe_duration(&chunk_path).await?;
        let audio_slice = chunks_dir.join(format!("audio_{:03}.wav", span.index));
        self.deps
            .media
            .extract_audio_slice(audio_path, &audio_slice, span.audio_start, slice_len)
            .await?;

        let segment_path = chunks_dir.join(format!("segment_{:03}.mp4", span.index));
        self.deps
            .media
            .mux_segment(&synth_path, &audio_slice, &segment_path)
            .await?;

        // The persisted chunk URL is the muxed segment in object storage,
        // never the raw synthesis URL.
        let segment_key = paths::output_segment_path(owner, span.index);
        let segment_bytes = tokio::fs::read(&segment_path).await?;
        self.deps
            .storage
            .upload(&segment_key, segment_bytes, "video/mp4")
            .await?;
        let segment_url = self
            .deps
            .storage
            .create_signed_url(&segment_key, SIGNED_URL_TTL_SECS)
            .await?;

        let credits = plan.chunk_duration.floor() as i64;
        let completion = ChunkCompletion {
            chunk_id: row.id.clone(),
            video_url: segment_url.clone(),
            synth_video_url: synth_url,
            synth_completed_at: Utc::now().to_rfc3339(),
            image_url,
            image_index: image_index as i64,
            credits_charged: credits,
        };

        // Muxing succeeded; a store hiccup must not fail the chunk. Fall back
        // to the minimal update.
        if let Err(e) = self.deps.chunks.complete_chunk(&completion).await {
            warn!(chunk_id = %row.id, "Full chunk update failed: {}; falling back", e);
            if let Err(fallback_err) = self
                .deps
                .chunks
                .update_chunk_minimal(
                    &row.id,
                    "COMPLETED",
                    Some(&segment_url),
                    Some(&e.user_message()),
                )
                .await
            {
                warn!(chunk_id = %row.id, "Minimal chunk update failed: {}", fallback_err);
            }
        }

        Ok(CompletedSegment {
            path: segment_path,
            credits,
        })
    }

    async fn pre_trim(
        &self,
        workspace: &JobWorkspace,
        video: PathBuf,
        audio: PathBuf,
        sync_offset: f64,
    ) -> Result<(PathBuf, PathBuf)> {
        if sync_offset.abs() < PRE_TRIM_EPSILON_SECS {
            return Ok((video, audio));
        }

        if sync_offset > 0.0 {
            // Dead space leads the video: trim its head so chunk 0 starts on
            // the downbeat. The master is used as-is.
            let aligned = workspace.file("user_video_aligned.mp4");
            self.deps
                .media
                .trim_video_head(&video, &aligned, sync_offset)
                .await?;
            Ok((aligned, audio))
        } else {
            // The video starts mid-song: trim the master's head instead.
            let aligned = workspace.file("master_audio_aligned.wav");
            self.deps
                .media
                .trim_audio_head(&audio, &aligned, -sync_offset)
                .await?;
            Ok((video, aligned))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn demo_job(
        duration_hint: &str,
        sync_offset: f64,
        chunk_duration: f64,
        images: usize,
    ) -> JobDbModel {
        let images: Vec<String> = (0..images)
            .map(|i| format!("https://cdn.example.com/image_{}.jpg", i))
            .collect();
        let mut job = JobDbModel::new(
            crate::domain::Tier::Demo,
            format!("https://cdn.example.com/{}", duration_hint),
            "https://cdn.example.com/master.wav",
            &images,
            Some("gen-1".to_string()),
        );
        job.analysis_status = AnalysisStatus::Analyzed.as_str().to_string();
        job.sync_offset = Some(sync_offset);
        job.bpm = Some(120.0);
        job.chunk_duration = Some(chunk_duration);
        job
    }

    struct Harness {
        deps: PipelineDeps,
        fetcher: Arc<FakeAssetFetcher>,
        media: Arc<FakeMediaRunner>,
        storage: Arc<FakeObjectStorage>,
        synthesis: Arc<FakeSynthesisClient>,
        chunks: Arc<InMemoryChunkRepository>,
        generations: Arc<InMemoryGenerationRepository>,
    }

    fn harness(video_duration: f64) -> Harness {
        let fetcher = Arc::new(FakeAssetFetcher::new());
        let media = Arc::new(FakeMediaRunner::new(video_duration));
        let storage = Arc::new(FakeObjectStorage::new());
        let synthesis = Arc::new(FakeSynthesisClient::new());
        let jobs = Arc::new(InMemoryJobRepository::new());
        let chunks = Arc::new(InMemoryChunkRepository::new());
        let generations = Arc::new(InMemoryGenerationRepository::with_generation("gen-1"));

        let deps = PipelineDeps {
            fetcher: fetcher.clone(),
            media: media.clone(),
            storage: storage.clone(),
            synthesis: synthesis.clone(),
            jobs,
            chunks: chunks.clone(),
            generations: generations.clone(),
        };
        Harness {
            deps,
            fetcher,
            media,
            storage,
            synthesis,
            chunks,
            generations,
        }
    }

    fn producer(h: &Harness) -> ChunkedProducer {
        ChunkedProducer::new(h.deps.clone()).with_poll_config(fast_poll_config())
    }

    #[tokio::test]
    async fn test_perfect_sync_single_chunk() {
        // 120 BPM, 8 s video, zero offset: one 8 s chunk, single-copy stitch.
        let h = harness(8.0);
        let job = demo_job("video_8s.mp4", 0.0, 8.0, 1);

        let artifact = producer(&h).produce(&job).await.unwrap();
        assert!(artifact.path().exists());

        // No pre-trim of either stream.
        assert!(!h.media.has_call("trim_video_head"));
        assert!(!h.media.has_call("trim_audio_head"));
        // Single segment: stitched by copy, not by concat.
        assert!(!h.media.has_call("concat_copy"));

        let chunks = h.chunks.all();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].status, "COMPLETED");
        assert_eq!(chunks[0].credits_charged, 8);
        assert!(chunks[0].video_url.as_ref().unwrap().contains("/outputs/"));
        assert!(
            !chunks[0]
                .video_url
                .as_ref()
                .unwrap()
                .contains("synth.example.com")
        );
        assert!(chunks[0].synth_request_id.is_some());

        assert_eq!(h.generations.cost_credits("gen-1"), 8);
        // 5% analysis checkpoint is the analyzer's; here the path runs
        // 10 -> 90 -> 95.
        assert_eq!(h.generations.progress("gen-1"), 95);

        // Inputs and the raw synthesis output were all fetched.
        let fetched = h.fetcher.fetched_urls();
        assert!(fetched.iter().any(|u| u.contains("video_8s.mp4")));
        assert!(fetched.iter().any(|u| u.contains("master.wav")));
        assert!(fetched.iter().any(|u| u.contains("synth.example.com")));
    }

    #[tokio::test]
    async fn test_dead_space_trims_video_head() {
        // 18 s video, +2 s offset: video pre-trimmed to 16 s, two full
        // chunks, flat audio grid.
        let h = harness(18.0);
        let job = demo_job("video_18s.mp4", 2.0, 8.0, 1);

        producer(&h).produce(&job).await.unwrap();

        assert!(h.media.has_call("trim_video_head head=2.000"));
        assert!(!h.media.has_call("trim_audio_head"));

        let chunks = h.chunks.all();
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert_eq!(chunk.status, "COMPLETED");
        }
        // Chunk 0 uses audio [0, 8), chunk 1 uses audio [8, 16): no per-chunk
        // delay anywhere.
        assert_eq!(chunks[0].audio_start_time, Some(0.0));
        assert_eq!(chunks[1].audio_start_time, Some(8.0));
        assert!(h.media.has_call("extract_audio_slice start=0.000 dur=8.000"));
        assert!(h.media.has_call("extract_audio_slice start=8.000 dur=8.000"));
    }

    #[tokio::test]
    async fn test_mid_song_start_trims_audio_and_drops_short_tail() {
        // 10 s video, -4 s offset: audio trimmed by 4 s, N_raw=2 but the 2 s
        // tail is dropped.
        let h = harness(10.0);
        let job = demo_job("video_10s.mp4", -4.0, 8.0, 1);

        producer(&h).produce(&job).await.unwrap();

        assert!(h.media.has_call("trim_audio_head head=4.000"));
        assert!(!h.media.has_call("trim_video_head"));

        let chunks = h.chunks.all();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].status, "COMPLETED");
        assert_eq!(h.synthesis.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_near_zero_offset_skips_pre_trim() {
        let h = harness(8.0);
        let job = demo_job("video_8s.mp4", 0.009, 8.0, 1);
        producer(&h).produce(&job).await.unwrap();
        assert!(!h.media.has_call("trim_video_head"));
        assert!(!h.media.has_call("trim_audio_head"));
    }

    #[tokio::test]
    async fn test_partial_chunk_failure_still_stitches() {
        // Four chunks; synthesis fails on chunk 2. The survivors stitch and
        // the job-level run succeeds.
        let h = harness(32.0);
        h.synthesis.fail_submission_at(2, "model rejected driver");
        let job = demo_job("video_32s.mp4", 0.0, 8.0, 2);

        let artifact = producer(&h).produce(&job).await.unwrap();
        assert!(artifact.path().exists());

        let chunks = h.chunks.all();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].status, "COMPLETED");
        assert_eq!(chunks[1].status, "COMPLETED");
        assert_eq!(chunks[2].status, "FAILED");
        assert!(
            chunks[2]
                .error_message
                .as_ref()
                .unwrap()
                .contains("model rejected driver")
        );
        assert_eq!(chunks[3].status, "COMPLETED");

        // Images rotate by chunk index even across the failure.
        assert_eq!(chunks[0].image_index, Some(0));
        assert_eq!(chunks[1].image_index, Some(1));
        assert_eq!(chunks[3].image_index, Some(1));

        // Credits only for completed chunks.
        assert_eq!(h.generations.cost_credits("gen-1"), 24);
        // The stitch ran over the three survivors.
        assert!(h.media.has_call("concat_copy segments=3"));
    }

    #[tokio::test]
    async fn test_all_chunks_failing_fails_the_job() {
        let h = harness(16.0);
        h.synthesis.fail_submission_at(0, "down");
        h.synthesis.fail_submission_at(1, "down");
        let job = demo_job("video_16s.mp4", 0.0, 8.0, 1);

        let err = producer(&h).produce(&job).await.unwrap_err();
        assert!(err.to_string().contains("No chunks completed"));
        assert!(h.chunks.all().iter().all(|c| c.status == "FAILED"));
    }

    #[tokio::test]
    async fn test_cooperative_cancellation_mid_run() {
        // Cancel lands while chunk 1 is finishing: the probe before chunk 2
        // observes it, remaining chunks sweep to FAILED.
        let h = harness(32.0);
        h.generations.cancel_at_status_read(3);
        let job = demo_job("video_32s.mp4", 0.0, 8.0, 1);

        let err = producer(&h).produce(&job).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let chunks = h.chunks.all();
        assert_eq!(chunks[0].status, "COMPLETED");
        assert_eq!(chunks[1].status, "COMPLETED");
        for chunk in &chunks[2..] {
            assert_eq!(chunk.status, "FAILED");
            assert_eq!(chunk.error_message.as_deref(), Some("Cancelled by user"));
        }
        // Chunk 2 was never submitted.
        assert_eq!(h.synthesis.submission_count(), 2);
        assert_eq!(h.generations.status("gen-1"), "cancelled");
    }

    #[tokio::test]
    async fn test_request_id_persisted_before_poll() {
        let h = harness(8.0);
        let job = demo_job("video_8s.mp4", 0.0, 8.0, 1);
        producer(&h).produce(&job).await.unwrap();

        let chunk = &h.chunks.all()[0];
        let requested_at = chunk.synth_requested_at.clone().unwrap();
        let completed_at = chunk.synth_completed_at.clone().unwrap();
        assert!(requested_at <= completed_at);
    }

    #[tokio::test]
    async fn test_store_hiccup_falls_back_to_minimal_update() {
        let h = harness(8.0);
        h.chunks.fail_complete_chunk();
        let job = demo_job("video_8s.mp4", 0.0, 8.0, 1);

        producer(&h).produce(&job).await.unwrap();

        // The minimal update still lands status + segment URL.
        let chunk = &h.chunks.all()[0];
        assert_eq!(chunk.status, "COMPLETED");
        assert!(chunk.video_url.as_ref().unwrap().contains("/outputs/"));
        assert!(chunk.error_message.is_some());
    }

    #[tokio::test]
    async fn test_tier_ceiling_rejected() {
        let h = harness(25.0);
        let job = demo_job("video_25s.mp4", 0.0, 8.0, 1);
        let err = producer(&h).produce(&job).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(h.synthesis.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_driver_uploads_use_temp_chunks_namespace() {
        let h = harness(16.0);
        let job = demo_job("video_16s.mp4", 0.0, 8.0, 1);
        producer(&h).produce(&job).await.unwrap();

        let uploads = h.storage.upload_paths();
        assert!(
            uploads
                .iter()
                .any(|p| p.starts_with(&format!("temp_chunks/{}/chunk_000.mp4", job.id)))
        );
        assert!(uploads.iter().any(|p| p == "outputs/gen-1/chunk_000.mp4"));
        assert!(uploads.iter().any(|p| p == "outputs/gen-1/chunk_001.mp4"));
    }
}
