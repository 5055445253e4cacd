//! Volatile storage kept in hash maps. Used by tests and throwaway worlds.

use std::collections::HashMap;

use super::{ChunkStorage, StoreError, StoredChunk};
use crate::server_state::voxels::chunk::ChunkCoord;

/// Chunk records and metadata held in memory. Lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    chunks: HashMap<ChunkCoord, StoredChunk>,
    meta: HashMap<String, String>,
    closed: bool,
}

impl MemoryStorage {
    /// Creates an empty, open store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl ChunkStorage for MemoryStorage {
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<StoredChunk>, StoreError> {
        self.ensure_open()?;
        Ok(self.chunks.get(&coord).cloned())
    }

    fn save_chunk(&mut self, coord: ChunkCoord, chunk: &StoredChunk) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.chunks.insert(coord, chunk.clone());
        Ok(())
    }

    fn get_meta(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        Ok(self.meta.get(key).cloned())
    }

    fn put_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}
