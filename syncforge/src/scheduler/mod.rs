//! Tier-prioritized, concurrency-bounded job scheduler.
//!
//! A single ticker drives the queue: each tick claims at most one job under
//! the capacity ceiling and runs it to terminal state on a spawned worker
//! task. Ticks are independent and idempotent; a failed tick just waits for
//! the next one.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SIGNED_URL_TTL_SECS;
use crate::database::models::JobDbModel;
use crate::database::repositories::SystemConfigRepository;
use crate::domain::GenerationStatus;
use crate::pipeline::{ChunkedProducer, PipelineDeps};
use crate::storage::paths;
use crate::{Error, Result};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Fixed tick period.
    pub tick_interval: Duration,
    /// Wall-clock ceiling for one job (industry tier bound).
    pub job_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            job_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// The worker scheduler.
pub struct Scheduler {
    deps: PipelineDeps,
    system_config: Arc<dyn SystemConfigRepository>,
    producer: Arc<ChunkedProducer>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        deps: PipelineDeps,
        system_config: Arc<dyn SystemConfigRepository>,
        producer: Arc<ChunkedProducer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            deps,
            system_config,
            producer,
            config,
        }
    }

    /// Start the ticker loop.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!(
                tick_secs = self.config.tick_interval.as_secs(),
                "Scheduler started"
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Scheduler shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = Arc::clone(&self).tick().await {
                            warn!("Scheduler tick failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// One tick: capacity gate, priority claim, cancellation probe, dispatch.
    /// Returns the worker handle when a job was dispatched.
    pub async fn tick(self: Arc<Self>) -> Result<Option<JoinHandle<()>>> {
        let limit = self.system_config.max_concurrent_jobs().await? as u64;
        let active = self.deps.jobs.count_processing_jobs().await?;
        if active >= limit {
            debug!(active, limit, "System saturated; waiting");
            return Ok(None);
        }

        let Some(job) = self.deps.jobs.claim_next_priority_job().await? else {
            debug!("Queue empty");
            return Ok(None);
        };

        // Cancellation probe before dispatch.
        if let Some(generation_id) = &job.generation_id
            && self.deps.generations.read_status(generation_id).await?
                == GenerationStatus::Cancelled
        {
            info!(job_id = %job.id, %generation_id, "Generation cancelled; dropping job");
            self.deps
                .jobs
                .mark_job_failed(&job.id, "Cancelled by user")
                .await?;
            return Ok(None);
        }

        info!(job_id = %job.id, tier = %job.tier, "Dispatching job");
        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            scheduler.run_job(job).await;
        });
        Ok(Some(handle))
    }

    async fn run_job(&self, job: JobDbModel) {
        let outcome = tokio::time::timeout(self.config.job_timeout, self.execute(&job)).await;

        match outcome {
            Ok(Ok(output_url)) => {
                info!(job_id = %job.id, output_url, "Job completed");
            }
            Ok(Err(e)) => {
                warn!(job_id = %job.id, "Job failed: {}", e);
                self.record_failure(&job, &e).await;
            }
            Err(_) => {
                let e = Error::Timeout(format!(
                    "Worker wall clock of {}s exceeded",
                    self.config.job_timeout.as_secs()
                ));
                warn!(job_id = %job.id, "{}", e);
                self.record_failure(&job, &e).await;
            }
        }
    }

    /// Run the pipeline, persist the final artifact, and record success on
    /// the job and its generation rollup.
    async fn execute(&self, job: &JobDbModel) -> Result<String> {
        let artifact = self.producer.produce(job).await?;

        let owner = job.generation_id.as_deref().unwrap_or(&job.id);
        let output_key = paths::final_output_path(owner);
        let bytes = artifact.read().await?;
        self.deps
            .storage
            .upload(&output_key, bytes, "video/mp4")
            .await?;
        let output_url = self
            .deps
            .storage
            .create_signed_url(&output_key, SIGNED_URL_TTL_SECS)
            .await?;

        // The bytes are persisted; the scratch workspace can go.
        drop(artifact);

        self.deps.jobs.mark_job_completed(&job.id, &output_url).await?;
        if let Some(generation_id) = &job.generation_id {
            self.deps
                .generations
                .mark_completed(generation_id, &output_key)
                .await?;
        }

        Ok(output_url)
    }

    async fn record_failure(&self, job: &JobDbModel, error: &Error) {
        let message = error.user_message();
        if let Err(db_err) = self.deps.jobs.mark_job_failed(&job.id, &message).await {
            warn!(job_id = %job.id, "Failed to record job failure: {}", db_err);
        }
        if let Some(generation_id) = &job.generation_id {
            // A cancelled generation keeps its status; mark_failed guards it.
            if let Err(db_err) = self
                .deps
                .generations
                .mark_failed(generation_id, &message)
                .await
            {
                warn!(%generation_id, "Failed to record generation failure: {}", db_err);
            }
        }
    }
}
