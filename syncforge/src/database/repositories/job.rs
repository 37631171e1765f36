//! Job repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::retry_on_sqlite_busy;
use crate::database::models::JobDbModel;
use crate::{Error, Result};

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get_job(&self, id: &str) -> Result<JobDbModel>;
    async fn create_job(&self, job: &JobDbModel) -> Result<()>;
    /// Count jobs currently in PROCESSING (the scheduler capacity gate).
    async fn count_processing_jobs(&self) -> Result<u64>;
    /// Atomically claim the priority head of the pending queue, transitioning
    /// it to PROCESSING.
    ///
    /// Ordering: is_first_time DESC, tier weight DESC, created_at ASC. A head
    /// whose tier requires analysis but is not yet ANALYZED is refused and
    /// remains PENDING; nothing else is claimed that tick.
    async fn claim_next_priority_job(&self) -> Result<Option<JobDbModel>>;
    /// Mark a job COMPLETED with its output URL.
    async fn mark_job_completed(&self, id: &str, output_url: &str) -> Result<()>;
    /// Mark a job FAILED with a truncated error message.
    async fn mark_job_failed(&self, id: &str, error: &str) -> Result<()>;
    /// Transition analysis_status (PENDING_ANALYSIS -> ANALYZING and friends).
    async fn set_analysis_status(&self, id: &str, status: &str) -> Result<()>;
    /// Persist analysis outputs and set analysis_status = ANALYZED.
    async fn update_job_analysis(
        &self,
        id: &str,
        sync_offset: f64,
        bpm: f64,
        chunk_duration: f64,
    ) -> Result<()>;
    /// Record an analysis failure on the job row.
    async fn mark_analysis_failed(&self, id: &str, error: &str) -> Result<()>;
}

/// SQLx implementation of [`JobRepository`].
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn get_job(&self, id: &str) -> Result<JobDbModel> {
        sqlx::query_as::<_, JobDbModel>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn create_job(&self, job: &JobDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, tier, is_first_time, user_video_url, master_audio_url,
                target_images, prompt, user_bpm, generation_id,
                sync_offset, bpm, chunk_duration, analysis_status, status,
                output_url, error_message, created_at, updated_at,
                started_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.tier)
        .bind(job.is_first_time)
        .bind(&job.user_video_url)
        .bind(&job.master_audio_url)
        .bind(&job.target_images)
        .bind(&job.prompt)
        .bind(job.user_bpm)
        .bind(&job.generation_id)
        .bind(job.sync_offset)
        .bind(job.bpm)
        .bind(job.chunk_duration)
        .bind(&job.analysis_status)
        .bind(&job.status)
        .bind(&job.output_url)
        .bind(&job.error_message)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .bind(&job.started_at)
        .bind(&job.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_processing_jobs(&self) -> Result<u64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = 'PROCESSING'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn claim_next_priority_job(&self) -> Result<Option<JobDbModel>> {
        retry_on_sqlite_busy("claim_next_priority_job", || async {
            let now = chrono::Utc::now().to_rfc3339();

            // Single-statement claim: SQLite serializes writers, so the
            // UPDATE..RETURNING is the counterpart of a row-lock-and-skip
            // fetch. The analysis gate lives in the outer WHERE so a gated
            // head is never claimed and stays PENDING for a later tick.
            let job = sqlx::query_as::<_, JobDbModel>(
                r#"
                UPDATE jobs
                SET status = 'PROCESSING', started_at = ?1, updated_at = ?1
                WHERE id = (
                    SELECT id FROM jobs
                    WHERE status = 'PENDING'
                    ORDER BY
                        is_first_time DESC,
                        CASE tier
                            WHEN 'demo' THEN 5
                            WHEN 'label' THEN 4
                            WHEN 'artist' THEN 3
                            WHEN 'open_mic' THEN 2
                            WHEN 'industry' THEN 1
                            ELSE 0
                        END DESC,
                        created_at ASC
                    LIMIT 1
                )
                AND (tier NOT IN ('demo', 'industry') OR analysis_status = 'ANALYZED')
                RETURNING *
                "#,
            )
            .bind(&now)
            .fetch_optional(&self.pool)
            .await?;

            Ok(job)
        })
        .await
    }

    async fn mark_job_completed(&self, id: &str, output_url: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_job_completed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE jobs SET status = 'COMPLETED', output_url = ?, completed_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(output_url)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_job_failed(&self, id: &str, error: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_job_failed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE jobs SET status = 'FAILED', error_message = ?, completed_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(crate::error::truncate_message(error))
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn set_analysis_status(&self, id: &str, status: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE jobs SET analysis_status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_job_analysis(
        &self,
        id: &str,
        sync_offset: f64,
        bpm: f64,
        chunk_duration: f64,
    ) -> Result<()> {
        retry_on_sqlite_busy("update_job_analysis", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                UPDATE jobs
                SET sync_offset = ?, bpm = ?, chunk_duration = ?,
                    analysis_status = 'ANALYZED', updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(sync_offset)
            .bind(bpm)
            .bind(chunk_duration)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_analysis_failed(&self, id: &str, error: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_analysis_failed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE jobs SET analysis_status = 'FAILED', status = 'FAILED', error_message = ?, updated_at = ? WHERE id = ?",
            )
            .bind(crate::error::truncate_message(error))
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::test_pool;
    use crate::domain::Tier;
    use rand::seq::SliceRandom;

    fn job_with(tier: Tier, first_time: bool, created_at: &str) -> JobDbModel {
        JobDbModel::new(
            tier,
            "https://cdn.example.com/v.mp4",
            "https://cdn.example.com/a.wav",
            &["https://cdn.example.com/i.jpg".to_string()],
            None,
        )
        .with_first_time(first_time)
        .with_created_at(created_at)
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let repo = SqlxJobRepository::new(test_pool().await);
        let job = job_with(Tier::Label, false, "2026-01-01T00:00:00+00:00");
        repo.create_job(&job).await.unwrap();

        let fetched = repo.get_job(&job.id).await.unwrap();
        assert_eq!(fetched.tier, "label");
        assert_eq!(fetched.status, "PENDING");
        assert!(repo.get_job("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_claim_orders_by_first_time_then_weight_then_age() {
        let repo = SqlxJobRepository::new(test_pool().await);

        let veteran_label = job_with(Tier::Label, false, "2026-01-01T00:00:00+00:00");
        let first_open_mic = job_with(Tier::OpenMic, true, "2026-01-02T00:00:00+00:00");
        let veteran_artist = job_with(Tier::Artist, false, "2026-01-01T01:00:00+00:00");
        for job in [&veteran_label, &first_open_mic, &veteran_artist] {
            repo.create_job(job).await.unwrap();
        }

        // First-time submitters win even at a lower tier weight.
        let claimed = repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, first_open_mic.id);
        assert_eq!(claimed.status, "PROCESSING");
        assert!(claimed.started_at.is_some());

        // Then the heavier tier.
        let claimed = repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, veteran_label.id);

        let claimed = repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, veteran_artist.id);

        assert!(repo.claim_next_priority_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_matches_comparator_on_randomized_fixtures() {
        let repo = SqlxJobRepository::new(test_pool().await);

        let tiers = [Tier::Label, Tier::Artist, Tier::OpenMic];
        let mut jobs = Vec::new();
        for day in 1..=4 {
            for (t, tier) in tiers.iter().enumerate() {
                for first in [false, true] {
                    let created = format!("2026-01-{:02}T0{}:00:00+00:00", day, t);
                    jobs.push(job_with(*tier, first, &created));
                }
            }
        }
        jobs.shuffle(&mut rand::rng());
        for job in &jobs {
            repo.create_job(job).await.unwrap();
        }

        // Lexicographic maximum under (is_first_time DESC, weight DESC,
        // created_at ASC).
        let expected = jobs
            .iter()
            .max_by(|a, b| {
                a.is_first_time
                    .cmp(&b.is_first_time)
                    .then_with(|| {
                        Tier::parse(&a.tier)
                            .unwrap()
                            .weight()
                            .cmp(&Tier::parse(&b.tier).unwrap().weight())
                    })
                    .then_with(|| b.created_at.cmp(&a.created_at))
            })
            .unwrap();

        let claimed = repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, expected.id);
    }

    #[tokio::test]
    async fn test_gated_head_blocks_tick_and_stays_pending() {
        let repo = SqlxJobRepository::new(test_pool().await);

        // Demo head without analysis blocks the queue even though a label job
        // is behind it.
        let demo = job_with(Tier::Demo, false, "2026-01-01T00:00:00+00:00");
        let label = job_with(Tier::Label, false, "2026-01-01T00:00:01+00:00");
        repo.create_job(&demo).await.unwrap();
        repo.create_job(&label).await.unwrap();

        assert!(repo.claim_next_priority_job().await.unwrap().is_none());
        assert_eq!(repo.get_job(&demo.id).await.unwrap().status, "PENDING");

        // Once analyzed the head is claimable.
        repo.update_job_analysis(&demo.id, 0.0, 120.0, 8.0)
            .await
            .unwrap();
        let claimed = repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, demo.id);
        assert_eq!(claimed.analysis_status, "ANALYZED");
        assert_eq!(claimed.chunk_duration, Some(8.0));
    }

    #[tokio::test]
    async fn test_terminal_transitions_and_error_truncation() {
        let repo = SqlxJobRepository::new(test_pool().await);
        let job = job_with(Tier::Industry, false, "2026-01-01T00:00:00+00:00");
        repo.create_job(&job).await.unwrap();

        repo.mark_job_failed(&job.id, &"e".repeat(2000)).await.unwrap();
        let failed = repo.get_job(&job.id).await.unwrap();
        assert_eq!(failed.status, "FAILED");
        assert_eq!(failed.error_message.unwrap().chars().count(), 500);

        repo.mark_job_completed(&job.id, "https://store/outputs/final.mp4")
            .await
            .unwrap();
        let done = repo.get_job(&job.id).await.unwrap();
        assert_eq!(done.status, "COMPLETED");
        assert_eq!(
            done.output_url.as_deref(),
            Some("https://store/outputs/final.mp4")
        );
    }

    #[tokio::test]
    async fn test_processing_count() {
        let repo = SqlxJobRepository::new(test_pool().await);
        for i in 0..3 {
            let job = job_with(Tier::Label, false, &format!("2026-01-01T00:00:0{}+00:00", i));
            repo.create_job(&job).await.unwrap();
        }
        assert_eq!(repo.count_processing_jobs().await.unwrap(), 0);
        repo.claim_next_priority_job().await.unwrap().unwrap();
        repo.claim_next_priority_job().await.unwrap().unwrap();
        assert_eq!(repo.count_processing_jobs().await.unwrap(), 2);
    }
}
