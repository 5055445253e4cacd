//! Decoration passes that run after the columns are filled: trees and caves.
//!
//! Both passes write through [`Chunk::set`], so any part of a tree or cave
//! that falls outside the chunk is silently dropped.

use noise::NoiseFn;

use super::WorldGenerator;
use crate::server_state::voxels::block::{BlockId, BlockPalette};
use crate::server_state::voxels::chunk::{Chunk, ChunkCoord, CHUNK_DEPTH, CHUNK_WIDTH};

/// Trees are rooted at least this far from the chunk edge.
const TREE_MARGIN: i32 = 2;
/// Leaves fill every position within this Manhattan distance of the crown.
const CANOPY_RADIUS: i32 = 3;

/// Derives the per-chunk random stream from the world seed and coordinate.
fn chunk_seed(seed: u32, coord: ChunkCoord) -> u64 {
    (seed as u64)
        ^ (coord.x as i64 as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (coord.z as i64 as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

pub(super) fn place_trees(generator: &WorldGenerator, chunk: &mut Chunk) {
    let palette = &generator.palette;
    let sea_level = generator.settings.sea_level;
    let mut rng = fastrand::Rng::with_seed(chunk_seed(generator.seed, chunk.coord()));

    for _ in 0..generator.settings.tree_attempts {
        let x = rng.i32(TREE_MARGIN..CHUNK_WIDTH as i32 - TREE_MARGIN);
        let z = rng.i32(TREE_MARGIN..CHUNK_DEPTH as i32 - TREE_MARGIN);
        let trunk_height = rng.i32(4..=6);

        let Some(ground) = chunk.highest_block_y(x, z) else {
            continue;
        };
        if chunk.get(x, ground, z) != palette.grass || ground <= sea_level {
            continue;
        }
        grow_tree(chunk, palette, x, ground + 1, z, trunk_height);
    }
}

fn grow_tree(chunk: &mut Chunk, palette: &BlockPalette, x: i32, base_y: i32, z: i32, trunk_height: i32) {
    for dy in 0..trunk_height {
        chunk.set(x, base_y + dy, z, palette.log);
    }

    let crown = base_y + trunk_height - 1;
    for dy in -1..=2_i32 {
        for dz in -2..=2_i32 {
            for dx in -2..=2_i32 {
                if dx.abs() + dy.abs() + dz.abs() > CANOPY_RADIUS {
                    continue;
                }
                let (lx, ly, lz) = (x + dx, crown + dy, z + dz);
                if chunk.get(lx, ly, lz) == palette.air {
                    chunk.set(lx, ly, lz, palette.leaves);
                }
            }
        }
    }
}

/// Carves air wherever the cave field exceeds the threshold inside the
/// cave band. Never touches the floor layer or fluids.
pub(super) fn carve_caves(generator: &WorldGenerator, chunk: &mut Chunk) {
    let settings = &generator.settings;
    let palette = &generator.palette;
    let frequency = settings.cave_frequency;
    let uncarvable: [BlockId; 3] = [palette.air, palette.bedrock, palette.water];
    let coord = chunk.coord();

    for y in settings.cave_min_y.max(1)..settings.cave_max_y {
        for z in 0..CHUNK_DEPTH {
            for x in 0..CHUNK_WIDTH {
                let (lx, lz) = (x as i32, z as i32);
                if uncarvable.contains(&chunk.get(lx, y, lz)) {
                    continue;
                }
                let Some((world_x, world_z)) = coord.to_world(x, z) else {
                    continue;
                };
                let sample = generator.cave_noise.get([
                    world_x as f64 * frequency,
                    y as f64 * frequency * 1.5,
                    world_z as f64 * frequency,
                ]);
                if sample > settings.cave_threshold {
                    chunk.set(lx, y, lz, palette.air);
                }
            }
        }
    }
}
