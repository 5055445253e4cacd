//! # Voxel Task System
//!
//! Tasks related to world generation, run on the task manager's worker pool.

pub mod chunk_generation_task;

pub use chunk_generation_task::ChunkGenerationTask;
