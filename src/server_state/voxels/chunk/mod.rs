//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a dense 16x256x16 column of block
//! ids plus a per-column biome map.
//!
//! ## Layout
//!
//! Blocks are stored in a flat vector indexed by
//! `y * (CHUNK_WIDTH * CHUNK_DEPTH) + z * CHUNK_WIDTH + x`. Walking the vector
//! visits whole horizontal layers in turn, which keeps natural terrain (long
//! runs of stone, then air) highly compressible with run-length encoding.
//!
//! ## Boundary policy
//!
//! Reads outside the chunk return air and writes outside the chunk are
//! ignored. Generation features and edits near chunk borders rely on this
//! instead of bounds-checking every write.

use super::block::{BlockId, AIR};

mod chunk_coords;

pub use chunk_coords::{split_world_coord, ChunkCoord, WORLD_BORDER};

/// Width of a chunk along X, in blocks.
pub const CHUNK_WIDTH: usize = 16;
/// Height of a chunk along Y, in blocks.
pub const CHUNK_HEIGHT: usize = 256;
/// Depth of a chunk along Z, in blocks.
pub const CHUNK_DEPTH: usize = 16;
/// Number of blocks in one horizontal layer.
pub const CHUNK_LAYER_SIZE: usize = CHUNK_WIDTH * CHUNK_DEPTH;
/// Total number of blocks in a chunk.
pub const CHUNK_VOLUME: usize = CHUNK_LAYER_SIZE * CHUNK_HEIGHT;

/// A fixed-size column of blocks addressed by chunk coordinates.
///
/// `dirty` is raised by every successful write and cleared only when the
/// world store has persisted the chunk. `generated` is raised once terrain
/// generation has populated the chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    coord: ChunkCoord,
    blocks: Vec<BlockId>,
    biomes: Vec<u8>,
    dirty: bool,
    generated: bool,
}

impl Chunk {
    /// Creates an all-air, ungenerated chunk.
    pub fn new(coord: ChunkCoord) -> Self {
        Chunk {
            coord,
            blocks: vec![AIR; CHUNK_VOLUME],
            biomes: vec![0; CHUNK_LAYER_SIZE],
            dirty: false,
            generated: false,
        }
    }

    /// Rebuilds a previously generated chunk from stored parts.
    ///
    /// # Returns
    /// `None` if either array has the wrong length.
    pub fn from_parts(coord: ChunkCoord, blocks: Vec<BlockId>, biomes: Vec<u8>) -> Option<Self> {
        if blocks.len() != CHUNK_VOLUME || biomes.len() != CHUNK_LAYER_SIZE {
            return None;
        }
        Some(Chunk {
            coord,
            blocks,
            biomes,
            dirty: false,
            generated: true,
        })
    }

    fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        let in_bounds = (0..CHUNK_WIDTH as i32).contains(&x)
            && (0..CHUNK_HEIGHT as i32).contains(&y)
            && (0..CHUNK_DEPTH as i32).contains(&z);
        in_bounds.then(|| y as usize * CHUNK_LAYER_SIZE + z as usize * CHUNK_WIDTH + x as usize)
    }

    /// Reads the block at chunk-local coordinates; air when out of range.
    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        match Self::index(x, y, z) {
            Some(index) => self.blocks[index],
            None => AIR,
        }
    }

    /// Writes the block at chunk-local coordinates.
    ///
    /// # Returns
    /// `false` (and no mutation) when out of range, otherwise `true` with the
    /// chunk marked dirty.
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockId) -> bool {
        match Self::index(x, y, z) {
            Some(index) => {
                self.blocks[index] = block;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Position of this chunk in the world.
    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Every block id in flat layer-major order.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// One biome id per column, row-major over `z` then `x`.
    pub fn biomes(&self) -> &[u8] {
        &self.biomes
    }

    /// Records the biome of a column. Ignored when out of range.
    pub fn set_biome(&mut self, x: usize, z: usize, biome: u8) {
        if x < CHUNK_WIDTH && z < CHUNK_DEPTH {
            self.biomes[z * CHUNK_WIDTH + x] = biome;
        }
    }

    /// Y of the topmost non-air block in a column, scanning down from the
    /// chunk ceiling.
    pub fn highest_block_y(&self, x: i32, z: i32) -> Option<i32> {
        (0..CHUNK_HEIGHT as i32).rev().find(|&y| self.get(x, y, z) != AIR)
    }

    /// Whether the chunk has writes that are not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag after a successful persist.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Whether terrain generation has run or the chunk came from storage.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Flags the chunk as populated by the generator.
    pub fn mark_generated(&mut self) {
        self.generated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(-1, 0, 0)]
    #[test_case(16, 0, 0)]
    #[test_case(0, -1, 0)]
    #[test_case(0, 256, 0)]
    #[test_case(0, 0, -1)]
    #[test_case(0, 0, 16)]
    fn out_of_range_is_air_and_write_is_rejected(x: i32, y: i32, z: i32) {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0));
        assert_eq!(chunk.get(x, y, z), AIR);
        assert!(!chunk.set(x, y, z, 14));
        assert!(!chunk.is_dirty());
        assert!(chunk.blocks().iter().all(|&b| b == AIR));
    }

    #[test]
    fn write_marks_dirty_and_is_readable() {
        let mut chunk = Chunk::new(ChunkCoord::new(2, -3));
        assert!(chunk.set(15, 255, 15, 14));
        assert!(chunk.is_dirty());
        assert_eq!(chunk.get(15, 255, 15), 14);
        chunk.mark_clean();
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn flat_index_is_layer_major() {
        let mut chunk = Chunk::new(ChunkCoord::default());
        chunk.set(3, 2, 1, 7);
        assert_eq!(chunk.blocks()[2 * CHUNK_LAYER_SIZE + CHUNK_WIDTH + 3], 7);
    }

    #[test]
    fn from_parts_rejects_wrong_length() {
        let coord = ChunkCoord::default();
        assert!(Chunk::from_parts(coord, vec![0; 10], vec![0; CHUNK_LAYER_SIZE]).is_none());
        let chunk = Chunk::from_parts(coord, vec![0; CHUNK_VOLUME], vec![0; CHUNK_LAYER_SIZE]).unwrap();
        assert!(chunk.is_generated());
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn highest_block_scans_from_ceiling() {
        let mut chunk = Chunk::new(ChunkCoord::default());
        assert_eq!(chunk.highest_block_y(4, 4), None);
        chunk.set(4, 10, 4, 14);
        chunk.set(4, 70, 4, 3);
        assert_eq!(chunk.highest_block_y(4, 4), Some(70));
    }
}
