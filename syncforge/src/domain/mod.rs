//! Domain types shared across the scheduler, analyzer and pipeline.

pub mod types;

pub use types::{
    AnalysisStatus, ChunkStatus, GenerationStage, GenerationStatus, JobStatus, Tier,
};
