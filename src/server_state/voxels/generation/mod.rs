//! # World Generation
//!
//! Deterministic procedural terrain: a pure function from
//! `(seed, chunk coordinate)` to a fully populated [`Chunk`].
//!
//! ## Passes
//!
//! 1. **Terrain** (`terrain`): fractal heightmap around sea level, biome
//!    classification from temperature/humidity noise, bottom-up column fill
//!    (deepslate below stone, sandy beaches, bare stone peaks) and ore
//!    injection into the stone and deepslate layers.
//! 2. **Trees** (`features`): a few seeded placement attempts per chunk on
//!    grass above sea level.
//! 3. **Caves** (`features`): 3D noise carving in a mid-height band. Runs last
//!    so caves can expose (and remove) ore.
//!
//! Nothing here reads global state. The seed, the tuning knobs and the block
//! ids to place are all owned by the [`WorldGenerator`] value, which makes
//! regenerating an evicted chunk always produce the same blocks.

use noise::Perlin;

use super::block::BlockPalette;
use super::chunk::{Chunk, ChunkCoord};

mod features;
mod terrain;

/// Surface classification of a world column.
///
/// Biomes only pick the surface block; the ids are what chunk data packets
/// carry in their biome map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Biome {
    /// Temperate and dry.
    Plains = 0,
    /// Temperate and humid.
    Forest = 1,
    /// Hot and dry. Sand surface.
    Desert = 2,
    /// Cold.
    Snowy = 3,
}

impl Biome {
    /// Thresholds the two climate samples (both roughly in `-1.0..=1.0`).
    pub fn classify(temperature: f64, humidity: f64) -> Self {
        if temperature < -0.25 {
            Biome::Snowy
        } else if temperature > 0.25 && humidity < 0.0 {
            Biome::Desert
        } else if humidity > 0.2 {
            Biome::Forest
        } else {
            Biome::Plains
        }
    }
}

/// Tuning knobs for terrain generation.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratorSettings {
    /// Terrain oscillates around this height; lower columns are flooded.
    pub sea_level: i32,
    /// Frequency of the first heightmap octave.
    pub base_frequency: f64,
    /// Amplitude, in blocks, of the first heightmap octave.
    pub base_amplitude: f64,
    /// Each octave halves the amplitude and doubles the frequency.
    pub octaves: usize,
    /// Frequency of the temperature and humidity fields.
    pub climate_frequency: f64,
    /// Frequency of the 3D ore field.
    pub ore_frequency: f64,
    /// Tree placement attempts per chunk.
    pub tree_attempts: u32,
    /// Blocks below this y are deepslate instead of stone.
    pub deepslate_level: i32,
    /// Columns whose surface lies below this height are sandy beaches.
    pub beach_height: i32,
    /// Columns whose surface lies above this height are bare stone.
    pub peak_height: i32,
    /// Whether the cave pass runs at all.
    pub caves: bool,
    /// Frequency of the 3D cave field.
    pub cave_frequency: f64,
    /// Cave field value above which a block is carved.
    pub cave_threshold: f64,
    /// Lowest y (inclusive) a cave may carve. Never below 1.
    pub cave_min_y: i32,
    /// Highest y (exclusive) a cave may carve.
    pub cave_max_y: i32,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            sea_level: 62,
            base_frequency: 0.01,
            base_amplitude: 24.0,
            octaves: 3,
            climate_frequency: 0.0025,
            ore_frequency: 0.1,
            tree_attempts: 3,
            deepslate_level: 16,
            beach_height: 64,
            peak_height: 90,
            caves: true,
            cave_frequency: 0.06,
            cave_threshold: 0.5,
            cave_min_y: 5,
            cave_max_y: 52,
        }
    }
}

/// Generates chunks for a single world seed.
///
/// The generator is immutable after construction and `Send + Sync`, so one
/// instance can be shared across the generation worker pool.
pub struct WorldGenerator {
    seed: u32,
    settings: GeneratorSettings,
    palette: BlockPalette,
    terrain_noise: Perlin,
    temperature_noise: Perlin,
    humidity_noise: Perlin,
    ore_noise: Perlin,
    cave_noise: Perlin,
}

impl WorldGenerator {
    /// Creates a generator for `seed` placing the ids named by `palette`.
    pub fn new(seed: u32, settings: GeneratorSettings, palette: BlockPalette) -> Self {
        WorldGenerator {
            seed,
            settings,
            palette,
            terrain_noise: Perlin::new(seed),
            temperature_noise: Perlin::new(seed.wrapping_add(1)),
            humidity_noise: Perlin::new(seed.wrapping_add(2)),
            ore_noise: Perlin::new(seed.wrapping_add(3)),
            cave_noise: Perlin::new(seed.wrapping_add(4)),
        }
    }

    /// A generator with the default settings and block table.
    pub fn with_defaults(seed: u32) -> Self {
        Self::new(seed, GeneratorSettings::default(), BlockPalette::default())
    }

    /// The world seed.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Tuning knobs in use.
    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Block ids this generator places.
    pub fn palette(&self) -> &BlockPalette {
        &self.palette
    }

    /// Produces the fully generated chunk at `coord`.
    ///
    /// The result depends only on the seed, the settings, the palette and
    /// `coord`; call order and previously generated chunks have no effect.
    pub fn generate(&self, coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord);
        terrain::fill_columns(self, &mut chunk);
        features::place_trees(self, &mut chunk);
        if self.settings.caves {
            features::carve_caves(self, &mut chunk);
        }
        chunk.mark_generated();
        chunk
    }

    /// Surface height of the world column `(world_x, world_z)`.
    pub fn terrain_height(&self, world_x: i32, world_z: i32) -> i32 {
        terrain::column_height(self, world_x, world_z)
    }
}

/// Generates the chunk at `(chunk_x, chunk_z)` for `seed` with default
/// settings.
pub fn generate(seed: u32, chunk_x: i32, chunk_z: i32) -> Chunk {
    WorldGenerator::with_defaults(seed).generate(ChunkCoord::new(chunk_x, chunk_z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::voxels::block::block_type::BlockType;
    use crate::server_state::voxels::chunk::{CHUNK_DEPTH, CHUNK_WIDTH};
    use test_case::test_case;

    #[test]
    fn same_seed_and_coordinate_is_identical() {
        let first = generate(12345, 0, 0);
        let second = generate(12345, 0, 0);
        assert_eq!(first.blocks(), second.blocks());
        assert_eq!(first.biomes(), second.biomes());
    }

    #[test_case(7, -3, 4)]
    #[test_case(0, 100, -100)]
    #[test_case(u32::MAX, -1, -1)]
    fn call_order_does_not_matter(seed: u32, x: i32, z: i32) {
        let generator = WorldGenerator::with_defaults(seed);
        let direct = generator.generate(ChunkCoord::new(x, z));
        generator.generate(ChunkCoord::new(x + 1, z));
        generator.generate(ChunkCoord::new(x, z - 1));
        let again = generator.generate(ChunkCoord::new(x, z));
        assert_eq!(direct, again);
    }

    #[test]
    fn different_seeds_differ() {
        assert_ne!(generate(1, 0, 0).blocks(), generate(2, 0, 0).blocks());
    }

    #[test]
    fn generated_chunk_is_flagged() {
        assert!(generate(42, 3, 3).is_generated());
    }

    #[test]
    fn floor_is_bedrock_everywhere() {
        let chunk = generate(99, -2, 5);
        for z in 0..CHUNK_DEPTH as i32 {
            for x in 0..CHUNK_WIDTH as i32 {
                assert_eq!(chunk.get(x, 0, z), BlockType::Bedrock.id());
            }
        }
    }

    #[test]
    fn columns_below_sea_level_are_flooded() {
        let generator = WorldGenerator::with_defaults(2024);
        let sea_level = generator.settings().sea_level;
        for cx in -4..4 {
            let coord = ChunkCoord::new(cx, 0);
            let chunk = generator.generate(coord);
            for x in 0..CHUNK_WIDTH {
                let (world_x, world_z) = coord.to_world(x, 0).unwrap();
                let height = generator.terrain_height(world_x, world_z);
                if height < sea_level {
                    assert_eq!(chunk.get(x as i32, sea_level, 0), BlockType::Water.id());
                    assert_eq!(chunk.get(x as i32, sea_level + 1, 0), BlockType::Air.id());
                }
            }
        }
    }

    #[test]
    fn chunks_at_the_world_edge_generate() {
        let edge = ChunkCoord::new(i32::MAX / 16, i32::MIN / 16);
        let chunk = WorldGenerator::with_defaults(5).generate(edge);
        assert!(chunk.is_generated());
        assert_eq!(chunk.get(15, 0, 15), BlockType::Bedrock.id());
    }

    #[test]
    fn biome_thresholds() {
        assert_eq!(Biome::classify(-0.5, 0.0), Biome::Snowy);
        assert_eq!(Biome::classify(0.5, -0.5), Biome::Desert);
        assert_eq!(Biome::classify(0.0, 0.5), Biome::Forest);
        assert_eq!(Biome::classify(0.0, 0.0), Biome::Plains);
    }
}
