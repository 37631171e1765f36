//! Closed status and tier sets, persisted as TEXT in the backing store.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Hard upper bound on a chunk's duration in seconds.
pub const CHUNK_LIMIT_SECS: f64 = 9.0;

/// Maximum submission length for the demo tier.
pub const DEMO_MAX_DURATION_SECS: f64 = 20.0;

/// Maximum submission length for the industry tier.
pub const INDUSTRY_MAX_DURATION_SECS: f64 = 90.0;

/// User tier. Governs scheduling priority and allowed submission duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Demo,
    Label,
    Artist,
    OpenMic,
    Industry,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Demo => "demo",
            Self::Label => "label",
            Self::Artist => "artist",
            Self::OpenMic => "open_mic",
            Self::Industry => "industry",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "demo" => Ok(Self::Demo),
            "label" => Ok(Self::Label),
            "artist" => Ok(Self::Artist),
            "open_mic" => Ok(Self::OpenMic),
            "industry" => Ok(Self::Industry),
            other => Err(Error::validation(format!("Invalid tier: {}", other))),
        }
    }

    /// Queue priority weight. Higher wins.
    pub fn weight(&self) -> i32 {
        match self {
            Self::Demo => 5,
            Self::Label => 4,
            Self::Artist => 3,
            Self::OpenMic => 2,
            Self::Industry => 1,
        }
    }

    /// Whether the pipeline must wait for analysis before starting.
    pub fn requires_analysis(&self) -> bool {
        matches!(self, Self::Demo | Self::Industry)
    }

    /// Validate a submission's video duration against the tier ceiling.
    pub fn validate_duration(&self, video_duration: f64) -> Result<()> {
        match self {
            Self::Demo => {
                if video_duration > DEMO_MAX_DURATION_SECS {
                    return Err(Error::validation(format!(
                        "demo tier limited to {:.0}s",
                        DEMO_MAX_DURATION_SECS
                    )));
                }
            }
            Self::Industry => {
                if video_duration > INDUSTRY_MAX_DURATION_SECS {
                    return Err(Error::validation(format!(
                        "industry tier limited to {:.0}s",
                        INDUSTRY_MAX_DURATION_SECS
                    )));
                }
            }
            _ => {
                if video_duration > CHUNK_LIMIT_SECS {
                    return Err(Error::TierRestriction(format!(
                        "clip your video to {:.0}s or less for the {} tier",
                        CHUNK_LIMIT_SECS,
                        self.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::validation(format!("Invalid job status: {}", other))),
        }
    }
}

/// Analysis gate status on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    PendingAnalysis,
    Analyzing,
    Analyzed,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAnalysis => "PENDING_ANALYSIS",
            Self::Analyzing => "ANALYZING",
            Self::Analyzed => "ANALYZED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING_ANALYSIS" => Ok(Self::PendingAnalysis),
            "ANALYZING" => Ok(Self::Analyzing),
            "ANALYZED" => Ok(Self::Analyzed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::validation(format!(
                "Invalid analysis status: {}",
                other
            ))),
        }
    }
}

/// Per-chunk status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(Error::validation(format!(
                "Invalid chunk status: {}",
                other
            ))),
        }
    }
}

/// User-facing rollup status on a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::validation(format!(
                "Invalid generation status: {}",
                other
            ))),
        }
    }

    /// Progress writes are only accepted while the rollup is live.
    pub fn accepts_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Generation stage shown to the user while a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Analyzing,
    Processing,
    ProcessingChunks,
    Stitching,
    Finalizing,
    Completed,
}

impl GenerationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyzing => "analyzing",
            Self::Processing => "processing",
            Self::ProcessingChunks => "processing_chunks",
            Self::Stitching => "stitching",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
