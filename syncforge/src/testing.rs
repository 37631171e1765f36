//! In-memory fakes shared across test modules.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::database::models::{ChunkCompletion, ChunkDbModel, GenerationDbModel, JobDbModel};
use crate::database::repositories::{
    ChunkRepository, GenerationRepository, JobRepository, SystemConfigRepository,
};
use crate::domain::{GenerationStatus, Tier};
use crate::error::truncate_message;
use crate::media::MediaRunner;
use crate::storage::{AssetFetcher, ObjectStorage};
use crate::synthesis::{PollConfig, SynthesisClient, SynthesisRequest, SynthesisStatus};
use crate::{Error, Result};

/// Poll config with a negligible interval for tests.
pub fn fast_poll_config() -> PollConfig {
    PollConfig {
        interval: std::time::Duration::from_millis(1),
        ..PollConfig::default()
    }
}

/// Fetcher that writes fixture bytes instead of hitting the network.
pub struct FakeAssetFetcher {
    fetched: Mutex<Vec<String>>,
}

impl FakeAssetFetcher {
    pub fn new() -> Self {
        Self {
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetFetcher for FakeAssetFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.fetched.lock().unwrap().push(url.to_string());
        tokio::fs::write(dest, b"fixture-bytes").await?;
        Ok(())
    }
}

/// Media runner that records argument summaries and fabricates outputs.
pub struct FakeMediaRunner {
    default_duration: f64,
    durations: Mutex<HashMap<PathBuf, f64>>,
    calls: Mutex<Vec<String>>,
}

impl FakeMediaRunner {
    pub fn new(default_duration: f64) -> Self {
        Self {
            default_duration,
            durations: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn duration_of(&self, path: &Path) -> f64 {
        self.durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(self.default_duration)
    }

    fn set_duration(&self, path: &Path, duration: f64) {
        self.durations
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), duration);
    }

    pub fn has_call(&self, needle: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c.contains(needle))
    }
}

#[async_trait]
impl MediaRunner for FakeMediaRunner {
    async fn probe_duration(&self, path: &Path) -> Result<f64> {
        Ok(self.duration_of(path))
    }

    async fn probe_has_video(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    async fn trim_video_head(&self, input: &Path, output: &Path, head_secs: f64) -> Result<()> {
        self.record(format!("trim_video_head head={:.3}", head_secs));
        tokio::fs::write(output, b"trimmed-video").await?;
        self.set_duration(output, self.duration_of(input) - head_secs);
        Ok(())
    }

    async fn trim_audio_head(&self, _input: &Path, output: &Path, head_secs: f64) -> Result<()> {
        self.record(format!("trim_audio_head head={:.3}", head_secs));
        tokio::fs::write(output, b"trimmed-audio").await?;
        Ok(())
    }

    async fn slice_video_reencode(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.record(format!(
            "slice_video_reencode start={:.3} dur={:.3}",
            start, duration
        ));
        tokio::fs::write(output, b"video-slice").await?;
        self.set_duration(output, duration);
        Ok(())
    }

    async fn slice_video_copy(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.record(format!(
            "slice_video_copy start={:.3} dur={:.3}",
            start, duration
        ));
        tokio::fs::write(output, b"video-slice-copy").await?;
        self.set_duration(output, duration);
        Ok(())
    }

    async fn extract_audio_slice(
        &self,
        _input: &Path,
        output: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        self.record(format!(
            "extract_audio_slice start={:.3} dur={:.3}",
            start, duration
        ));
        tokio::fs::write(output, b"audio-slice").await?;
        Ok(())
    }

    async fn transcode_to_wav(&self, _input: &Path, output: &Path) -> Result<()> {
        self.record("transcode_to_wav".to_string());
        tokio::fs::write(output, b"wav").await?;
        Ok(())
    }

    async fn extract_alignment_track(&self, _input: &Path, output: &Path) -> Result<()> {
        self.record("extract_alignment_track".to_string());
        tokio::fs::write(output, b"alignment").await?;
        Ok(())
    }

    async fn mux_segment(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<()> {
        self.record("mux_segment".to_string());
        tokio::fs::write(output, b"segment").await?;
        Ok(())
    }

    async fn concat_copy(&self, segments: &[PathBuf], output: &Path) -> Result<()> {
        self.record(format!("concat_copy segments={}", segments.len()));
        tokio::fs::write(output, b"stitched").await?;
        Ok(())
    }
}

/// Recording object storage.
pub struct FakeObjectStorage {
    uploads: Mutex<Vec<(String, usize, String)>>,
}

impl FakeObjectStorage {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn upload_paths(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStorage for FakeObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_string(), bytes.len(), content_type.to_string()));
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, _ttl_secs: u64) -> Result<String> {
        Ok(format!("https://store.example.com/{}?sig=signed", path))
    }

    async fn remove(&self, _paths: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Replayable synthesis client: succeeds unless a submission index is
/// scripted to fail.
pub struct FakeSynthesisClient {
    counter: AtomicU64,
    failures: Mutex<HashMap<u64, String>>,
    results: Mutex<HashMap<String, String>>,
    submissions: Mutex<Vec<SynthesisRequest>>,
}

impl FakeSynthesisClient {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            failures: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Fail the nth submission (0-based) with the given message.
    pub fn fail_submission_at(&self, index: u64, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(index, message.to_string());
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

#[async_trait]
impl SynthesisClient for FakeSynthesisClient {
    async fn submit(&self, request: &SynthesisRequest) -> Result<String> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().unwrap().push(request.clone());

        if let Some(message) = self.failures.lock().unwrap().get(&index) {
            return Err(Error::external(message.clone()));
        }

        let request_id = format!("req-{}", index);
        self.results.lock().unwrap().insert(
            request_id.clone(),
            format!("https://synth.example.com/out_{}.mp4", index),
        );
        Ok(request_id)
    }

    async fn poll_status(&self, request_id: &str) -> Result<SynthesisStatus> {
        if self.results.lock().unwrap().contains_key(request_id) {
            Ok(SynthesisStatus::Completed)
        } else {
            Ok(SynthesisStatus::Failed {
                error: Some("unknown request".to_string()),
            })
        }
    }

    async fn fetch_result(&self, request_id: &str) -> Result<Option<String>> {
        Ok(self.results.lock().unwrap().get(request_id).cloned())
    }
}

/// In-memory job store.
pub struct InMemoryJobRepository {
    jobs: Mutex<HashMap<String, JobDbModel>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, job: JobDbModel) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn get_job(&self, id: &str) -> Result<JobDbModel> {
        self.jobs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn create_job(&self, job: &JobDbModel) -> Result<()> {
        self.insert(job.clone());
        Ok(())
    }

    async fn count_processing_jobs(&self) -> Result<u64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.status == "PROCESSING")
            .count() as u64)
    }

    async fn claim_next_priority_job(&self) -> Result<Option<JobDbModel>> {
        let mut jobs = self.jobs.lock().unwrap();
        let head = jobs
            .values()
            .filter(|j| j.status == "PENDING")
            .max_by(|a, b| {
                a.is_first_time
                    .cmp(&b.is_first_time)
                    .then_with(|| {
                        let wa = Tier::parse(&a.tier).map(|t| t.weight()).unwrap_or(0);
                        let wb = Tier::parse(&b.tier).map(|t| t.weight()).unwrap_or(0);
                        wa.cmp(&wb)
                    })
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .cloned();

        let Some(head) = head else {
            return Ok(None);
        };

        let tier = Tier::parse(&head.tier)?;
        if tier.requires_analysis() && head.analysis_status != "ANALYZED" {
            return Ok(None);
        }

        let job = jobs.get_mut(&head.id).unwrap();
        job.status = "PROCESSING".to_string();
        job.started_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(Some(job.clone()))
    }

    async fn mark_job_completed(&self, id: &str, output_url: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or_else(|| Error::not_found("Job", id))?;
        job.status = "COMPLETED".to_string();
        job.output_url = Some(output_url.to_string());
        Ok(())
    }

    async fn mark_job_failed(&self, id: &str, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or_else(|| Error::not_found("Job", id))?;
        job.status = "FAILED".to_string();
        job.error_message = Some(truncate_message(error));
        Ok(())
    }

    async fn set_analysis_status(&self, id: &str, status: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or_else(|| Error::not_found("Job", id))?;
        job.analysis_status = status.to_string();
        Ok(())
    }

    async fn update_job_analysis(
        &self,
        id: &str,
        sync_offset: f64,
        bpm: f64,
        chunk_duration: f64,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or_else(|| Error::not_found("Job", id))?;
        job.sync_offset = Some(sync_offset);
        job.bpm = Some(bpm);
        job.chunk_duration = Some(chunk_duration);
        job.analysis_status = "ANALYZED".to_string();
        Ok(())
    }

    async fn mark_analysis_failed(&self, id: &str, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(id).ok_or_else(|| Error::not_found("Job", id))?;
        job.analysis_status = "FAILED".to_string();
        job.status = "FAILED".to_string();
        job.error_message = Some(truncate_message(error));
        Ok(())
    }
}

/// In-memory chunk store with an optional full-update failure mode.
pub struct InMemoryChunkRepository {
    chunks: Mutex<Vec<ChunkDbModel>>,
    fail_complete: Mutex<bool>,
}

impl InMemoryChunkRepository {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            fail_complete: Mutex::new(false),
        }
    }

    /// Make `complete_chunk` fail, forcing the minimal-update fallback.
    pub fn fail_complete_chunk(&self) {
        *self.fail_complete.lock().unwrap() = true;
    }

    pub fn all(&self) -> Vec<ChunkDbModel> {
        let mut chunks = self.chunks.lock().unwrap().clone();
        chunks.sort_by_key(|c| c.chunk_index);
        chunks
    }

    fn with_chunk<T>(&self, id: &str, f: impl FnOnce(&mut ChunkDbModel) -> T) -> Result<T> {
        let mut chunks = self.chunks.lock().unwrap();
        let chunk = chunks
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("Chunk", id))?;
        Ok(f(chunk))
    }
}

#[async_trait]
impl ChunkRepository for InMemoryChunkRepository {
    async fn insert_chunk(&self, chunk: &ChunkDbModel) -> Result<()> {
        self.chunks.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> Result<ChunkDbModel> {
        self.with_chunk(id, |c| c.clone())
    }

    async fn list_chunks_for_job(&self, job_id: &str) -> Result<Vec<ChunkDbModel>> {
        let mut chunks: Vec<ChunkDbModel> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ChunkDbModel>> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.synth_request_id.as_deref() == Some(request_id))
            .cloned())
    }

    async fn set_chunk_processing(&self, id: &str) -> Result<()> {
        self.with_chunk(id, |c| c.status = "PROCESSING".to_string())
    }

    async fn set_synth_request(
        &self,
        id: &str,
        request_id: &str,
        requested_at: &str,
    ) -> Result<()> {
        self.with_chunk(id, |c| {
            c.synth_request_id = Some(request_id.to_string());
            c.synth_requested_at = Some(requested_at.to_string());
        })
    }

    async fn complete_chunk(&self, completion: &ChunkCompletion) -> Result<()> {
        if *self.fail_complete.lock().unwrap() {
            return Err(Error::Other("simulated write failure".to_string()));
        }
        self.with_chunk(&completion.chunk_id, |c| {
            c.status = "COMPLETED".to_string();
            c.video_url = Some(completion.video_url.clone());
            c.synth_video_url = Some(completion.synth_video_url.clone());
            c.synth_completed_at = Some(completion.synth_completed_at.clone());
            c.image_url = Some(completion.image_url.clone());
            c.image_index = Some(completion.image_index);
            c.credits_charged = completion.credits_charged;
        })
    }

    async fn update_chunk_minimal(
        &self,
        id: &str,
        status: &str,
        video_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        self.with_chunk(id, |c| {
            c.status = status.to_string();
            if let Some(url) = video_url {
                c.video_url = Some(url.to_string());
            }
            c.error_message = error.map(truncate_message);
        })
    }

    async fn mark_chunk_failed(&self, id: &str, error: &str) -> Result<()> {
        self.with_chunk(id, |c| {
            c.status = "FAILED".to_string();
            c.error_message = Some(truncate_message(error));
        })
    }

    async fn fail_remaining_chunks(&self, job_id: &str, error: &str) -> Result<u64> {
        let mut chunks = self.chunks.lock().unwrap();
        let mut swept = 0;
        for chunk in chunks
            .iter_mut()
            .filter(|c| c.job_id == job_id && c.status != "COMPLETED")
        {
            chunk.status = "FAILED".to_string();
            chunk.error_message = Some(truncate_message(error));
            swept += 1;
        }
        Ok(swept)
    }
}

/// In-memory generation store with scripted cancellation.
pub struct InMemoryGenerationRepository {
    generations: Mutex<HashMap<String, GenerationDbModel>>,
    status_reads: AtomicU64,
    cancel_at_read: Mutex<Option<u64>>,
}

impl InMemoryGenerationRepository {
    pub fn new() -> Self {
        Self {
            generations: Mutex::new(HashMap::new()),
            status_reads: AtomicU64::new(0),
            cancel_at_read: Mutex::new(None),
        }
    }

    pub fn with_generation(id: &str) -> Self {
        let repo = Self::new();
        repo.generations
            .lock()
            .unwrap()
            .insert(id.to_string(), GenerationDbModel::new(id));
        repo
    }

    /// Flip the generation to cancelled at the nth status read (1-based).
    pub fn cancel_at_status_read(&self, read: u64) {
        *self.cancel_at_read.lock().unwrap() = Some(read);
    }

    pub fn progress(&self, id: &str) -> i64 {
        self.generations.lock().unwrap()[id].progress_percentage
    }

    pub fn status(&self, id: &str) -> String {
        self.generations.lock().unwrap()[id].status.clone()
    }

    pub fn cost_credits(&self, id: &str) -> i64 {
        self.generations.lock().unwrap()[id].cost_credits
    }

    pub fn final_output_path(&self, id: &str) -> Option<String> {
        self.generations.lock().unwrap()[id].final_output_path.clone()
    }
}

#[async_trait]
impl GenerationRepository for InMemoryGenerationRepository {
    async fn create_generation(&self, generation: &GenerationDbModel) -> Result<()> {
        self.generations
            .lock()
            .unwrap()
            .insert(generation.id.clone(), generation.clone());
        Ok(())
    }

    async fn get_generation(&self, id: &str) -> Result<GenerationDbModel> {
        self.generations
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Generation", id))
    }

    async fn read_status(&self, id: &str) -> Result<GenerationStatus> {
        let reads = self.status_reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(cancel_at) = *self.cancel_at_read.lock().unwrap()
            && reads >= cancel_at
        {
            let mut generations = self.generations.lock().unwrap();
            if let Some(generation) = generations.get_mut(id) {
                generation.status = "cancelled".to_string();
            }
        }

        let generations = self.generations.lock().unwrap();
        let generation = generations
            .get(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        GenerationStatus::parse(&generation.status)
    }

    async fn update_progress(
        &self,
        id: &str,
        stage: crate::domain::GenerationStage,
        percentage: u8,
    ) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        let status = GenerationStatus::parse(&generation.status)?;
        if !status.accepts_progress() {
            return Ok(());
        }
        if status == GenerationStatus::Pending {
            generation.status = "processing".to_string();
        }
        generation.progress_percentage = generation.progress_percentage.max(percentage as i64);
        generation.current_stage = Some(stage.as_str().to_string());
        Ok(())
    }

    async fn set_estimated_completion(&self, id: &str, at: Option<&str>) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        generation.estimated_completion_at = at.map(|s| s.to_string());
        Ok(())
    }

    async fn set_cost_credits(&self, id: &str, credits: i64) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        generation.cost_credits = credits;
        Ok(())
    }

    async fn mark_completed(&self, id: &str, final_output_path: &str) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        generation.status = "completed".to_string();
        generation.current_stage = Some("completed".to_string());
        generation.progress_percentage = 100;
        generation.final_output_path = Some(final_output_path.to_string());
        generation.estimated_completion_at = None;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        if generation.status != "cancelled" {
            generation.status = "failed".to_string();
            generation.error_message = Some(truncate_message(error));
        }
        Ok(())
    }

    async fn mark_cancelled(&self, id: &str) -> Result<()> {
        let mut generations = self.generations.lock().unwrap();
        let generation = generations
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Generation", id))?;
        if matches!(generation.status.as_str(), "pending" | "processing") {
            generation.status = "cancelled".to_string();
        }
        Ok(())
    }
}

/// In-memory system config.
pub struct InMemorySystemConfigRepository {
    values: Mutex<HashMap<String, String>>,
}

impl InMemorySystemConfigRepository {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SystemConfigRepository for InMemorySystemConfigRepository {
    async fn max_concurrent_jobs(&self) -> Result<u32> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .get("max_concurrent_jobs")
            .and_then(|v| v.parse().ok())
            .filter(|v| *v > 0)
            .unwrap_or(crate::config::DEFAULT_MAX_CONCURRENT_JOBS))
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
