//! Chunk repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::retry_on_sqlite_busy;
use crate::database::models::{ChunkCompletion, ChunkDbModel};
use crate::{Error, Result};

/// Chunk repository trait.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    async fn insert_chunk(&self, chunk: &ChunkDbModel) -> Result<()>;
    async fn get_chunk(&self, id: &str) -> Result<ChunkDbModel>;
    async fn list_chunks_for_job(&self, job_id: &str) -> Result<Vec<ChunkDbModel>>;
    /// Locate a chunk by its synthesis request id (webhook correlation).
    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ChunkDbModel>>;
    async fn set_chunk_processing(&self, id: &str) -> Result<()>;
    /// Persist the synthesis request id and submission time. Must be called
    /// before the first poll attempt.
    async fn set_synth_request(&self, id: &str, request_id: &str, requested_at: &str)
        -> Result<()>;
    /// Full observability update on success.
    async fn complete_chunk(&self, completion: &ChunkCompletion) -> Result<()>;
    /// Minimal fallback when the full update fails: status, video_url and a
    /// truncated error only.
    async fn update_chunk_minimal(
        &self,
        id: &str,
        status: &str,
        video_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<()>;
    async fn mark_chunk_failed(&self, id: &str, error: &str) -> Result<()>;
    /// Mark every not-yet-completed chunk of a job FAILED with the given
    /// error. Returns the number of chunks swept.
    async fn fail_remaining_chunks(&self, job_id: &str, error: &str) -> Result<u64>;
}

/// SQLx implementation of [`ChunkRepository`].
pub struct SqlxChunkRepository {
    pool: SqlitePool,
}

impl SqlxChunkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkRepository for SqlxChunkRepository {
    async fn insert_chunk(&self, chunk: &ChunkDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunks (
                id, job_id, generation_id, chunk_index, status,
                video_chunk_start_time, video_chunk_end_time, audio_start_time,
                chunk_duration, sync_offset,
                synth_request_id, synth_requested_at, synth_completed_at,
                synth_video_url, video_url, image_url, image_index,
                credits_charged, error_message, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.job_id)
        .bind(&chunk.generation_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.status)
        .bind(chunk.video_chunk_start_time)
        .bind(chunk.video_chunk_end_time)
        .bind(chunk.audio_start_time)
        .bind(chunk.chunk_duration)
        .bind(chunk.sync_offset)
        .bind(&chunk.synth_request_id)
        .bind(&chunk.synth_requested_at)
        .bind(&chunk.synth_completed_at)
        .bind(&chunk.synth_video_url)
        .bind(&chunk.video_url)
        .bind(&chunk.image_url)
        .bind(chunk.image_index)
        .bind(chunk.credits_charged)
        .bind(&chunk.error_message)
        .bind(&chunk.created_at)
        .bind(&chunk.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chunk(&self, id: &str) -> Result<ChunkDbModel> {
        sqlx::query_as::<_, ChunkDbModel>("SELECT * FROM chunks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Chunk", id))
    }

    async fn list_chunks_for_job(&self, job_id: &str) -> Result<Vec<ChunkDbModel>> {
        let chunks = sqlx::query_as::<_, ChunkDbModel>(
            "SELECT * FROM chunks WHERE job_id = ? ORDER BY chunk_index",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ChunkDbModel>> {
        let chunk = sqlx::query_as::<_, ChunkDbModel>(
            "SELECT * FROM chunks WHERE synth_request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chunk)
    }

    async fn set_chunk_processing(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE chunks SET status = 'PROCESSING', updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_synth_request(
        &self,
        id: &str,
        request_id: &str,
        requested_at: &str,
    ) -> Result<()> {
        retry_on_sqlite_busy("set_synth_request", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE chunks SET synth_request_id = ?, synth_requested_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(request_id)
            .bind(requested_at)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn complete_chunk(&self, completion: &ChunkCompletion) -> Result<()> {
        retry_on_sqlite_busy("complete_chunk", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                UPDATE chunks
                SET status = 'COMPLETED',
                    video_url = ?,
                    synth_video_url = ?,
                    synth_completed_at = ?,
                    image_url = ?,
                    image_index = ?,
                    credits_charged = ?,
                    error_message = NULL,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&completion.video_url)
            .bind(&completion.synth_video_url)
            .bind(&completion.synth_completed_at)
            .bind(&completion.image_url)
            .bind(completion.image_index)
            .bind(completion.credits_charged)
            .bind(&now)
            .bind(&completion.chunk_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn update_chunk_minimal(
        &self,
        id: &str,
        status: &str,
        video_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE chunks SET status = ?, video_url = COALESCE(?, video_url), error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(video_url)
        .bind(error.map(crate::error::truncate_message))
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_chunk_failed(&self, id: &str, error: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_chunk_failed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE chunks SET status = 'FAILED', error_message = ?, updated_at = ? WHERE id = ?",
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

    async fn fail_remaining_chunks(&self, job_id: &str, error: &str) -> Result<u64> {
        retry_on_sqlite_busy("fail_remaining_chunks", || async {
            let now = chrono::Utc::now().to_rfc3339();
            let result = sqlx::query(
                "UPDATE chunks SET status = 'FAILED', error_message = ?, updated_at = ? WHERE job_id = ? AND status != 'COMPLETED'",
            )
            .bind(crate::error::truncate_message(error))
            .bind(&now)
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::test_pool;

    #[tokio::test]
    async fn test_chunk_indexes_unique_per_job() {
        let repo = SqlxChunkRepository::new(test_pool().await);
        for i in 0..3 {
            repo.insert_chunk(&ChunkDbModel::new("job-1", None, i))
                .await
                .unwrap();
        }

        let dup = ChunkDbModel::new("job-1", None, 1);
        assert!(repo.insert_chunk(&dup).await.is_err());

        let indexes: Vec<i64> = repo
            .list_chunks_for_job("job-1")
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_request_id_persisted_before_completion() {
        let repo = SqlxChunkRepository::new(test_pool().await);
        let chunk = ChunkDbModel::new("job-1", Some("gen-1".into()), 0);
        repo.insert_chunk(&chunk).await.unwrap();

        repo.set_synth_request(&chunk.id, "req-42", "2026-01-01T00:00:00+00:00")
            .await
            .unwrap();

        // Webhook correlation finds the chunk before the poll completes.
        let found = repo.find_by_request_id("req-42").await.unwrap().unwrap();
        assert_eq!(found.id, chunk.id);
        assert_eq!(found.status, "PENDING");

        repo.complete_chunk(&ChunkCompletion {
            chunk_id: chunk.id.clone(),
            video_url: "https://store/outputs/gen-1/chunk_000.mp4?sig=x".into(),
            synth_video_url: "https://synth.example.com/out.mp4".into(),
            synth_completed_at: "2026-01-01T00:01:00+00:00".into(),
            image_url: "https://cdn.example.com/i.jpg".into(),
            image_index: 0,
            credits_charged: 8,
        })
        .await
        .unwrap();

        let done = repo.get_chunk(&chunk.id).await.unwrap();
        assert_eq!(done.status, "COMPLETED");
        assert_eq!(done.credits_charged, 8);
        assert!(done.video_url.unwrap().contains("/outputs/"));
        assert!(done.synth_requested_at.unwrap() <= done.synth_completed_at.unwrap());
    }

    #[tokio::test]
    async fn test_fail_remaining_spares_completed() {
        let repo = SqlxChunkRepository::new(test_pool().await);
        let done = ChunkDbModel::new("job-1", None, 0);
        let pending = ChunkDbModel::new("job-1", None, 1);
        let processing = ChunkDbModel::new("job-1", None, 2);
        for c in [&done, &pending, &processing] {
            repo.insert_chunk(c).await.unwrap();
        }
        repo.update_chunk_minimal(&done.id, "COMPLETED", Some("https://store/outputs/x"), None)
            .await
            .unwrap();
        repo.set_chunk_processing(&processing.id).await.unwrap();

        let swept = repo
            .fail_remaining_chunks("job-1", "Cancelled by user")
            .await
            .unwrap();
        assert_eq!(swept, 2);

        let chunks = repo.list_chunks_for_job("job-1").await.unwrap();
        assert_eq!(chunks[0].status, "COMPLETED");
        assert_eq!(chunks[1].status, "FAILED");
        assert_eq!(chunks[1].error_message.as_deref(), Some("Cancelled by user"));
        assert_eq!(chunks[2].status, "FAILED");
    }
}
