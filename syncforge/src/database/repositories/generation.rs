//! Generation repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::retry_on_sqlite_busy;
use crate::database::models::GenerationDbModel;
use crate::domain::{GenerationStage, GenerationStatus};
use crate::{Error, Result};

/// Generation repository trait.
#[async_trait]
pub trait GenerationRepository: Send + Sync {
    async fn create_generation(&self, generation: &GenerationDbModel) -> Result<()>;
    async fn get_generation(&self, id: &str) -> Result<GenerationDbModel>;
    /// Read only the rollup status (the cancellation probe).
    async fn read_status(&self, id: &str) -> Result<GenerationStatus>;
    /// Advance stage and progress. The percentage is monotonic and only moves
    /// while the generation is pending or processing; a pending generation is
    /// promoted to processing.
    async fn update_progress(&self, id: &str, stage: GenerationStage, percentage: u8)
        -> Result<()>;
    async fn set_estimated_completion(&self, id: &str, at: Option<&str>) -> Result<()>;
    async fn set_cost_credits(&self, id: &str, credits: i64) -> Result<()>;
    /// Terminal success: final path, 100%, stage completed, estimate cleared.
    async fn mark_completed(&self, id: &str, final_output_path: &str) -> Result<()>;
    /// Terminal failure. A generation already cancelled keeps its status.
    async fn mark_failed(&self, id: &str, error: &str) -> Result<()>;
    /// User-initiated cancellation (observed by poll points).
    async fn mark_cancelled(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of [`GenerationRepository`].
pub struct SqlxGenerationRepository {
    pool: SqlitePool,
}

impl SqlxGenerationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GenerationRepository for SqlxGenerationRepository {
    async fn create_generation(&self, generation: &GenerationDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generations (
                id, status, current_stage, progress_percentage,
                estimated_completion_at, final_output_path, cost_credits,
                error_message, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&generation.id)
        .bind(&generation.status)
        .bind(&generation.current_stage)
        .bind(generation.progress_percentage)
        .bind(&generation.estimated_completion_at)
        .bind(&generation.final_output_path)
        .bind(generation.cost_credits)
        .bind(&generation.error_message)
        .bind(&generation.created_at)
        .bind(&generation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_generation(&self, id: &str) -> Result<GenerationDbModel> {
        sqlx::query_as::<_, GenerationDbModel>("SELECT * FROM generations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Generation", id))
    }

    async fn read_status(&self, id: &str) -> Result<GenerationStatus> {
        let status = sqlx::query_scalar::<_, String>("SELECT status FROM generations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Generation", id))?;
        GenerationStatus::parse(&status)
    }

    async fn update_progress(
        &self,
        id: &str,
        stage: GenerationStage,
        percentage: u8,
    ) -> Result<()> {
        retry_on_sqlite_busy("update_generation_progress", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                UPDATE generations
                SET progress_percentage = CASE
                        WHEN ?2 > progress_percentage THEN ?2
                        ELSE progress_percentage
                    END,
                    current_stage = ?3,
                    status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END,
                    updated_at = ?4
                WHERE id = ?1 AND status IN ('pending', 'processing')
                "#,
            )
            .bind(id)
            .bind(percentage as i64)
            .bind(stage.as_str())
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn set_estimated_completion(&self, id: &str, at: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("UPDATE generations SET estimated_completion_at = ?, updated_at = ? WHERE id = ?")
            .bind(at)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_cost_credits(&self, id: &str, credits: i64) -> Result<()> {
        retry_on_sqlite_busy("set_cost_credits", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query("UPDATE generations SET cost_credits = ?, updated_at = ? WHERE id = ?")
                .bind(credits)
                .bind(&now)
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn mark_completed(&self, id: &str, final_output_path: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_generation_completed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                r#"
                UPDATE generations
                SET status = 'completed',
                    current_stage = 'completed',
                    progress_percentage = 100,
                    final_output_path = ?,
                    estimated_completion_at = NULL,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(final_output_path)
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        retry_on_sqlite_busy("mark_generation_failed", || async {
            let now = chrono::Utc::now().to_rfc3339();
            sqlx::query(
                "UPDATE generations SET status = 'failed', error_message = ?, updated_at = ? WHERE id = ? AND status != 'cancelled'",
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

    async fn mark_cancelled(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE generations SET status = 'cancelled', updated_at = ? WHERE id = ? AND status IN ('pending', 'processing')",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::db::test_pool;

    async fn repo_with_generation() -> (SqlxGenerationRepository, String) {
        let repo = SqlxGenerationRepository::new(test_pool().await);
        let generation = GenerationDbModel::new("gen-1");
        repo.create_generation(&generation).await.unwrap();
        (repo, generation.id)
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let (repo, id) = repo_with_generation().await;

        repo.update_progress(&id, GenerationStage::Analyzing, 5)
            .await
            .unwrap();
        repo.update_progress(&id, GenerationStage::ProcessingChunks, 50)
            .await
            .unwrap();
        // A late, lower write must not regress the percentage.
        repo.update_progress(&id, GenerationStage::ProcessingChunks, 30)
            .await
            .unwrap();

        let generation = repo.get_generation(&id).await.unwrap();
        assert_eq!(generation.progress_percentage, 50);
        assert_eq!(generation.current_stage.as_deref(), Some("processing_chunks"));
        assert_eq!(generation.status, "processing");
    }

    #[tokio::test]
    async fn test_cancelled_ignores_progress_and_failure() {
        let (repo, id) = repo_with_generation().await;

        repo.update_progress(&id, GenerationStage::Analyzing, 10)
            .await
            .unwrap();
        repo.mark_cancelled(&id).await.unwrap();

        repo.update_progress(&id, GenerationStage::Stitching, 90)
            .await
            .unwrap();
        repo.mark_failed(&id, "late failure").await.unwrap();

        let generation = repo.get_generation(&id).await.unwrap();
        assert_eq!(generation.status, "cancelled");
        assert_eq!(generation.progress_percentage, 10);
    }

    #[tokio::test]
    async fn test_completion_clears_estimate() {
        let (repo, id) = repo_with_generation().await;

        repo.set_estimated_completion(&id, Some("2026-01-01T00:05:00+00:00"))
            .await
            .unwrap();
        repo.set_cost_credits(&id, 24).await.unwrap();
        repo.mark_completed(&id, "outputs/gen-1/final.mp4")
            .await
            .unwrap();

        let generation = repo.get_generation(&id).await.unwrap();
        assert_eq!(generation.status, "completed");
        assert_eq!(generation.progress_percentage, 100);
        assert_eq!(generation.cost_credits, 24);
        assert!(generation.estimated_completion_at.is_none());
        assert_eq!(
            generation.final_output_path.as_deref(),
            Some("outputs/gen-1/final.mp4")
        );
    }
}
