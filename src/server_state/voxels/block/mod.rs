//! # Block Module
//!
//! This module provides block identifiers and the block-id table that world
//! generation is parameterised with.
//!
//! Chunks store raw [`BlockId`]s. Generation never consults a global registry;
//! it receives a [`BlockPalette`] which names the ids it should place for each
//! role (floor, stone, surface, fluid, ...).

use block_type::BlockType;

pub mod block_type;

/// The underlying integer type used to represent block types in memory,
/// in storage and on the wire.
pub type BlockId = u16;

/// The id every empty or out-of-range position reads as.
pub const AIR: BlockId = BlockType::Air as BlockId;

/// A single ore placed during generation.
///
/// An ore is only placed inside its depth band `[min_y, max_y)` and only
/// where a 3D noise sample exceeds [`OreSpec::threshold`]. Higher
/// frequencies lower the threshold, so common ores appear more often.
#[derive(Clone, Debug, PartialEq)]
pub struct OreSpec {
    /// Block id placed for this ore in stone.
    pub block: BlockId,
    /// Block id placed for this ore in deepslate.
    pub deep_block: BlockId,
    /// Relative abundance in `0.0..=1.0`.
    pub frequency: f64,
    /// Lowest y (inclusive) the ore may appear at.
    pub min_y: i32,
    /// Highest y (exclusive) the ore may appear at.
    pub max_y: i32,
}

impl OreSpec {
    /// Noise value a position must exceed to become this ore.
    pub fn threshold(&self) -> f64 {
        0.9 - 0.5 * self.frequency.clamp(0.0, 1.0)
    }

    /// The ore variant that replaces `host`, if the ore grows in it.
    pub fn replacing(&self, host: BlockId, palette: &BlockPalette) -> Option<BlockId> {
        if host == palette.stone {
            Some(self.block)
        } else if host == palette.deepslate {
            Some(self.deep_block)
        } else {
            None
        }
    }

    /// Whether `y` lies within the ore's depth band.
    pub fn in_band(&self, y: i32) -> bool {
        (self.min_y..self.max_y).contains(&y)
    }
}

/// The block-id table injected into the world generator.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockPalette {
    /// Empty space.
    pub air: BlockId,
    /// Floor layer at y = 0.
    pub bedrock: BlockId,
    /// Underground fill and peak surface.
    pub stone: BlockId,
    /// Underground fill below the deepslate level.
    pub deepslate: BlockId,
    /// Transition layer under the surface.
    pub dirt: BlockId,
    /// Temperate surface.
    pub grass: BlockId,
    /// Desert and beach surface.
    pub sand: BlockId,
    /// Fills sunken columns up to sea level.
    pub water: BlockId,
    /// Tree trunk.
    pub log: BlockId,
    /// Tree canopy.
    pub leaves: BlockId,
    /// Ores in placement priority order; the first matching ore wins.
    pub ores: Vec<OreSpec>,
}

impl Default for BlockPalette {
    fn default() -> Self {
        BlockPalette {
            air: BlockType::Air.id(),
            bedrock: BlockType::Bedrock.id(),
            stone: BlockType::Stone.id(),
            deepslate: BlockType::Deepslate.id(),
            dirt: BlockType::Dirt.id(),
            grass: BlockType::GrassBlock.id(),
            sand: BlockType::Sand.id(),
            water: BlockType::Water.id(),
            log: BlockType::OakLog.id(),
            leaves: BlockType::OakLeaves.id(),
            ores: vec![
                OreSpec {
                    block: BlockType::CoalOre.id(),
                    deep_block: BlockType::DeepslateCoalOre.id(),
                    frequency: 0.6,
                    min_y: 5,
                    max_y: 128,
                },
                OreSpec {
                    block: BlockType::IronOre.id(),
                    deep_block: BlockType::DeepslateIronOre.id(),
                    frequency: 0.4,
                    min_y: 1,
                    max_y: 64,
                },
                OreSpec {
                    block: BlockType::GoldOre.id(),
                    deep_block: BlockType::DeepslateGoldOre.id(),
                    frequency: 0.3,
                    min_y: 1,
                    max_y: 32,
                },
                OreSpec {
                    block: BlockType::DiamondOre.id(),
                    deep_block: BlockType::DeepslateDiamondOre.id(),
                    frequency: 0.2,
                    min_y: 1,
                    max_y: 16,
                },
            ],
        }
    }
}
