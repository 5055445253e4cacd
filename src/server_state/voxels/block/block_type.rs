//! # Block Type Module
//!
//! This module defines the block types the server knows about by name.
//! The wire and storage formats only ever carry the numeric [`BlockId`];
//! `BlockType` exists so that generation and tests can refer to blocks
//! without magic numbers.

use num_derive::FromPrimitive;

use super::BlockId;

/// Enumerates the named block types of the reference world.
///
/// Discriminants are wire-stable block ids. The `FromPrimitive` derive allows
/// conversion back from the numeric id received from clients or storage.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u16)]
pub enum BlockType {
    /// Empty space. Every out-of-range read yields this block.
    Air = 0,
    /// Grass-covered dirt, the surface of temperate biomes.
    GrassBlock = 3,
    /// Plain dirt, used for the transition layer below the surface.
    Dirt = 4,
    /// Sand, the surface of desert biomes and beaches.
    Sand = 11,
    /// The bulk of the underground, and the surface of mountain peaks.
    Stone = 14,
    /// Replaces stone near the bottom of the world.
    Deepslate = 18,
    /// Coal ore, common and shallow.
    CoalOre = 81,
    /// Coal ore embedded in deepslate.
    DeepslateCoalOre = 82,
    /// Iron ore.
    IronOre = 83,
    /// Iron ore embedded in deepslate.
    DeepslateIronOre = 84,
    /// Gold ore, found deeper than iron.
    GoldOre = 87,
    /// Gold ore embedded in deepslate.
    DeepslateGoldOre = 88,
    /// Diamond ore, rare and only found near the bottom of the world.
    DiamondOre = 95,
    /// Diamond ore embedded in deepslate.
    DeepslateDiamondOre = 96,
    /// Tree trunk.
    OakLog = 118,
    /// Tree canopy.
    OakLeaves = 126,
    /// The unbreakable floor at y = 0.
    Bedrock = 236,
    /// Still water, fills terrain below sea level.
    Water = 237,
}

impl BlockType {
    /// Returns the wire id of this block type.
    pub fn id(self) -> BlockId {
        self as BlockId
    }

    /// Looks up the named block type for a raw id.
    ///
    /// # Returns
    /// `None` when the id has no name on this server. Such ids are still
    /// legal block values; the server stores and relays them untouched.
    pub fn from_id(id: BlockId) -> Option<Self> {
        num::FromPrimitive::from_u16(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(BlockType::Air, 0)]
    #[test_case(BlockType::Stone, 14)]
    #[test_case(BlockType::Bedrock, 236)]
    #[test_case(BlockType::Water, 237)]
    #[test_case(BlockType::Deepslate, 18)]
    #[test_case(BlockType::DeepslateDiamondOre, 96)]
    fn ids_are_wire_stable(block: BlockType, id: BlockId) {
        assert_eq!(block.id(), id);
        assert_eq!(BlockType::from_id(id), Some(block));
    }

    #[test]
    fn unknown_ids_have_no_name() {
        assert_eq!(BlockType::from_id(1), None);
        assert_eq!(BlockType::from_id(u16::MAX), None);
    }
}
