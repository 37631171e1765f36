//! Chunked production pipeline.

pub mod plan;
pub mod producer;
pub mod workspace;

pub use plan::{ChunkPlan, ChunkSpan, plan_chunks};
pub use producer::{ChunkedProducer, PipelineDeps};
pub use workspace::{FinalArtifact, JobWorkspace};
