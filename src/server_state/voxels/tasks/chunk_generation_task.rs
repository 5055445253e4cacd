//! # Chunk Generation Task
//!
//! Generates one chunk on a pool worker. The generator is shared read-only,
//! and the finished chunk is handed back whole, so no partially generated
//! chunk is ever visible to the world store.

use std::sync::Arc;

use crate::server_state::{
    task_management::task::Task,
    voxels::{
        chunk::{Chunk, ChunkCoord},
        generation::WorldGenerator,
    },
};

/// A task that generates the chunk at `coord`.
pub struct ChunkGenerationTask {
    /// The world's generator; pure, so safe to share across workers
    generator: Arc<WorldGenerator>,
    coord: ChunkCoord,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `generator` - The generator of the world the chunk belongs to
    /// * `coord` - The chunk coordinates to generate
    pub fn new(generator: Arc<WorldGenerator>, coord: ChunkCoord) -> Self {
        ChunkGenerationTask { generator, coord }
    }
}

impl Task for ChunkGenerationTask {
    type Output = Chunk;

    fn process(&self) -> Chunk {
        self.generator.generate(self.coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::task_management::TaskManager;

    #[test]
    fn pool_output_matches_inline_generation() {
        let generator = Arc::new(WorldGenerator::with_defaults(12345));
        let mut manager = TaskManager::new(2);
        let coords = [ChunkCoord::new(0, 0), ChunkCoord::new(-1, 3), ChunkCoord::new(5, -2)];
        for coord in coords {
            manager.publish_task(Box::new(ChunkGenerationTask::new(generator.clone(), coord)));
        }

        let chunks = manager.wait_for_all();
        assert_eq!(chunks.len(), coords.len());
        for chunk in chunks {
            assert!(chunk.is_generated());
            assert_eq!(chunk, generator.generate(chunk.coord()));
        }
    }
}
