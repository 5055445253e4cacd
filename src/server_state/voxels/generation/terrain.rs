//! Heightmap, biome and column fill pass.

use noise::NoiseFn;

use super::{Biome, WorldGenerator};
use crate::server_state::voxels::chunk::{Chunk, CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};

/// Lowest allowed surface, leaving room for floor, stone and dirt layers.
const MIN_SURFACE: i32 = 5;
/// Offset between the sample spaces of different ores, so their veins
/// do not coincide.
const ORE_SAMPLE_OFFSET: f64 = 173.31;

pub(super) fn column_height(generator: &WorldGenerator, world_x: i32, world_z: i32) -> i32 {
    let settings = &generator.settings;
    let mut amplitude = settings.base_amplitude;
    let mut frequency = settings.base_frequency;
    let mut offset = 0.0;

    for _ in 0..settings.octaves {
        let sample = generator
            .terrain_noise
            .get([world_x as f64 * frequency, world_z as f64 * frequency]);
        offset += sample * amplitude;
        amplitude *= 0.5;
        frequency *= 2.0;
    }

    let height = (settings.sea_level as f64 + offset).round() as i32;
    height.clamp(MIN_SURFACE, CHUNK_HEIGHT as i32 - 1)
}

pub(super) fn column_biome(generator: &WorldGenerator, world_x: i32, world_z: i32) -> Biome {
    let frequency = generator.settings.climate_frequency;
    let point = [world_x as f64 * frequency, world_z as f64 * frequency];
    let temperature = generator.temperature_noise.get(point);
    let humidity = generator.humidity_noise.get(point);
    Biome::classify(temperature, humidity)
}

/// Fills every column of `chunk` bottom-up and injects ore into its rock.
///
/// Per column: bedrock at y = 0, deepslate below the deepslate level, stone
/// up to `height - 4`, dirt up to `height - 1`, the surface at `height`,
/// water up to sea level for sunken columns and air above. The surface is
/// bare stone on peaks, sand on beaches and otherwise decided by the biome.
pub(super) fn fill_columns(generator: &WorldGenerator, chunk: &mut Chunk) {
    let palette = &generator.palette;
    let settings = &generator.settings;
    let coord = chunk.coord();

    for z in 0..CHUNK_DEPTH {
        for x in 0..CHUNK_WIDTH {
            let Some((world_x, world_z)) = coord.to_world(x, z) else {
                continue;
            };
            let height = column_height(generator, world_x, world_z);
            let biome = column_biome(generator, world_x, world_z);
            chunk.set_biome(x, z, biome as u8);

            let surface = if height > settings.peak_height {
                palette.stone
            } else if height < settings.beach_height {
                palette.sand
            } else {
                match biome {
                    Biome::Desert => palette.sand,
                    Biome::Plains | Biome::Forest | Biome::Snowy => palette.grass,
                }
            };

            let (lx, lz) = (x as i32, z as i32);
            let top = height.max(settings.sea_level);
            for y in 0..=top {
                let block = if y == 0 {
                    palette.bedrock
                } else if y < height - 3 && y < settings.deepslate_level {
                    palette.deepslate
                } else if y < height - 3 {
                    palette.stone
                } else if y < height {
                    palette.dirt
                } else if y == height {
                    surface
                } else {
                    palette.water
                };
                chunk.set(lx, y, lz, block);
            }

            place_ores(generator, chunk, lx, lz, height);
        }
    }
}

/// Turns stone and deepslate into ore where the ore field is strong enough.
///
/// Scans strictly between the floor and the surface. Ores are tried in
/// palette order and take the variant matching the rock they replace.
fn place_ores(generator: &WorldGenerator, chunk: &mut Chunk, x: i32, z: i32, height: i32) {
    let palette = &generator.palette;
    let frequency = generator.settings.ore_frequency;
    let Some((world_x, world_z)) = chunk.coord().to_world(x as usize, z as usize) else {
        return;
    };

    for y in 1..height {
        let host = chunk.get(x, y, z);
        if host != palette.stone && host != palette.deepslate {
            continue;
        }
        for (index, ore) in palette.ores.iter().enumerate() {
            if !ore.in_band(y) {
                continue;
            }
            let Some(block) = ore.replacing(host, palette) else {
                continue;
            };
            let offset = ORE_SAMPLE_OFFSET * (index + 1) as f64;
            let sample = generator.ore_noise.get([
                world_x as f64 * frequency + offset,
                y as f64 * frequency,
                world_z as f64 * frequency + offset,
            ]);
            if sample > ore.threshold() {
                chunk.set(x, y, z, block);
                break;
            }
        }
    }
}
