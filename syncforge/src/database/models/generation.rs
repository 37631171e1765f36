//! Generation row model.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::GenerationStatus;
use crate::Result;

/// Generation row. The user-facing rollup mutated by both the analyzer and
/// the pipeline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct GenerationDbModel {
    pub id: String,
    /// pending, processing, completed, failed, cancelled.
    pub status: String,
    pub current_stage: Option<String>,
    pub progress_percentage: i64,
    pub estimated_completion_at: Option<String>,
    pub final_output_path: Option<String>,
    pub cost_credits: i64,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl GenerationDbModel {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            status: GenerationStatus::Pending.as_str().to_string(),
            current_stage: None,
            progress_percentage: 0,
            estimated_completion_at: None,
            final_output_path: None,
            cost_credits: 0,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn status(&self) -> Result<GenerationStatus> {
        GenerationStatus::parse(&self.status)
    }
}
