//! # Chunk Storage
//!
//! The persistent backing store of a world: a chunk table keyed by chunk
//! coordinate and a small string key/value metadata table.
//!
//! The world store talks to storage only through [`ChunkStorage`], so the
//! on-disk layout ([`FileStorage`]) can be swapped for an in-memory one
//! ([`MemoryStorage`]) in tests. Every call is synchronous and touches at
//! most one chunk record.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::block::BlockId;
use super::chunk::{Chunk, ChunkCoord, CHUNK_VOLUME};
use crate::codec::rle::{self, Run};
use crate::codec::CodecError;

mod file_storage;
mod memory_storage;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;

/// Metadata key holding the world seed.
pub const META_SEED: &str = "seed";
/// Metadata key holding the world age in ticks.
pub const META_WORLD_AGE: &str = "world_age";
/// Metadata key holding the time of day.
pub const META_TIME_OF_DAY: &str = "time_of_day";

/// Failures of the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file or directory operation failed.
    #[error("storage I/O failed at {path}: {source}")]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A chunk record could not be encoded.
    #[error("failed to serialize chunk {coord:?}: {source}")]
    Serialize {
        /// The chunk being saved.
        coord: ChunkCoord,
        /// The underlying error.
        #[source]
        source: bincode::Error,
    },

    /// A stored chunk record does not decode into a chunk.
    #[error("corrupt chunk record {coord:?}: {reason}")]
    CorruptChunk {
        /// The chunk being loaded.
        coord: ChunkCoord,
        /// What was wrong with it.
        reason: String,
    },

    /// The metadata table does not parse.
    #[error("corrupt world metadata: {0}")]
    CorruptMetadata(String),

    /// Some dirty chunks failed to persist during a flush.
    #[error("{0} dirty chunks could not be saved")]
    Unsaved(usize),

    /// The store was already closed.
    #[error("storage is closed")]
    Closed,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// One persisted chunk record.
///
/// `modified` records whether the chunk differs from what the generator
/// would produce for its coordinate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Whether the chunk was edited after generation.
    pub modified: bool,
    /// Block ids, run-length encoded.
    pub blocks: Vec<Run>,
    /// One biome id per column.
    pub biomes: Vec<u8>,
}

impl StoredChunk {
    /// Compresses a chunk into its storage record.
    pub fn from_chunk(chunk: &Chunk, modified: bool) -> Self {
        StoredChunk {
            modified,
            blocks: rle::compress(chunk.blocks()),
            biomes: chunk.biomes().to_vec(),
        }
    }

    /// Rebuilds the chunk. The result is generated and clean.
    pub fn into_chunk(self, coord: ChunkCoord) -> Result<Chunk, StoreError> {
        let blocks: Vec<BlockId> = rle::decompress(&self.blocks, CHUNK_VOLUME).map_err(|err: CodecError| {
            StoreError::CorruptChunk {
                coord,
                reason: err.to_string(),
            }
        })?;
        Chunk::from_parts(coord, blocks, self.biomes).ok_or_else(|| StoreError::CorruptChunk {
            coord,
            reason: "biome map has the wrong length".to_string(),
        })
    }
}

/// A persistent chunk table plus metadata table.
pub trait ChunkStorage: Send {
    /// Reads the record for `coord`, `None` if it was never saved.
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<StoredChunk>, StoreError>;

    /// Writes (or replaces) the record for `coord`.
    fn save_chunk(&mut self, coord: ChunkCoord, chunk: &StoredChunk) -> Result<(), StoreError>;

    /// Reads a metadata value, `None` if the key was never written.
    fn get_meta(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a metadata value.
    fn put_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Flushes and releases the store. Later calls may fail with
    /// [`StoreError::Closed`].
    fn close(&mut self) -> Result<(), StoreError>;
}
