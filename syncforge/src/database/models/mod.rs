//! Row models for the backing store.

pub mod chunk;
pub mod generation;
pub mod job;

pub use chunk::{ChunkCompletion, ChunkDbModel};
pub use generation::GenerationDbModel;
pub use job::JobDbModel;
