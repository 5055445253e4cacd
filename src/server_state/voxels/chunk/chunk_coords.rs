//! # Chunk Coordinates
//!
//! Conversions between world block coordinates, chunk coordinates and
//! chunk-local coordinates, plus the square (Chebyshev) neighbourhoods used
//! for render distance and eviction.

use cgmath::Point3;
use serde::{Deserialize, Serialize};

use super::{CHUNK_DEPTH, CHUNK_WIDTH};

/// Entity positions further than this from the origin on X or Z are
/// outside the world.
pub const WORLD_BORDER: f64 = 30_000_000.0;

/// Integer coordinates of a chunk column on the XZ plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Chunk index along the X axis.
    pub x: i32,
    /// Chunk index along the Z axis.
    pub z: i32,
}

/// Splits one world axis coordinate into `(chunk, local)`.
///
/// Uses floor division, so negative coordinates map into the chunk on their
/// left: `-1` becomes chunk `-1`, local `size - 1`.
pub fn split_world_coord(value: i32, size: usize) -> (i32, usize) {
    let size = size as i32;
    let chunk = value.div_euclid(size);
    let local = ((value % size) + size) % size;
    (chunk, local as usize)
}

impl ChunkCoord {
    /// Creates the coordinate of chunk `(x, z)`.
    pub fn new(x: i32, z: i32) -> Self {
        ChunkCoord { x, z }
    }

    /// Translates a world block position into its chunk and the local
    /// `(x, z)` position inside that chunk.
    pub fn from_world(world_x: i32, world_z: i32) -> (Self, usize, usize) {
        let (chunk_x, local_x) = split_world_coord(world_x, CHUNK_WIDTH);
        let (chunk_z, local_z) = split_world_coord(world_z, CHUNK_DEPTH);
        (ChunkCoord::new(chunk_x, chunk_z), local_x, local_z)
    }

    /// The chunk containing a (possibly fractional) entity position.
    pub fn containing(position: Point3<f64>) -> Self {
        let (chunk, _, _) = Self::from_world(position.x.floor() as i32, position.z.floor() as i32);
        chunk
    }

    /// Inverse of [`ChunkCoord::from_world`] for the X and Z axes.
    ///
    /// # Returns
    /// `None` when the world position does not fit in an `i32`, which only
    /// happens for chunks outside [`ChunkCoord::in_world`].
    pub fn to_world(&self, local_x: usize, local_z: usize) -> Option<(i32, i32)> {
        let axis = |chunk: i32, size: usize, local: usize| {
            chunk
                .checked_mul(size as i32)?
                .checked_add(i32::try_from(local).ok()?)
        };
        Some((
            axis(self.x, CHUNK_WIDTH, local_x)?,
            axis(self.z, CHUNK_DEPTH, local_z)?,
        ))
    }

    /// Whether every block column of this chunk has an `i32` world position.
    pub fn in_world(&self) -> bool {
        self.to_world(0, 0).is_some() && self.to_world(CHUNK_WIDTH - 1, CHUNK_DEPTH - 1).is_some()
    }

    /// Max of the per-axis distances, in chunks.
    pub fn chebyshev_distance(&self, other: &ChunkCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.z.abs_diff(other.z))
    }

    /// Every chunk within `radius` (Chebyshev) of `self`, in row-major order.
    ///
    /// Chunks outside [`ChunkCoord::in_world`] are skipped, so the square is
    /// clipped at the edge of the world.
    pub fn square_around(&self, radius: u32) -> impl Iterator<Item = ChunkCoord> {
        let center = *self;
        let radius = i32::try_from(radius).unwrap_or(i32::MAX);
        (-radius..=radius).flat_map(move |dx| {
            (-radius..=radius).filter_map(move |dz| {
                let coord = ChunkCoord::new(center.x.checked_add(dx)?, center.z.checked_add(dz)?);
                coord.in_world().then_some(coord)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn negative_world_coordinates_floor_into_previous_chunk() {
        let (chunk, local_x, local_z) = ChunkCoord::from_world(-5, -20);
        assert_eq!(chunk, ChunkCoord::new(-1, -2));
        assert_eq!(local_x, 11);
        assert_eq!(local_z, 12);
    }

    #[test_case(-1, -1, 15)]
    #[test_case(0, 0, 0)]
    #[test_case(15, 0, 15)]
    #[test_case(16, 1, 0)]
    #[test_case(-16, -1, 0)]
    #[test_case(-17, -2, 15)]
    fn split_matches_floor_division(value: i32, chunk: i32, local: usize) {
        assert_eq!(split_world_coord(value, 16), (chunk, local));
    }

    #[test]
    fn world_translation_round_trips() {
        for world_x in -70..70 {
            for world_z in [-33, -1, 0, 5, 48] {
                let (chunk, local_x, local_z) = ChunkCoord::from_world(world_x, world_z);
                assert!(local_x < CHUNK_WIDTH && local_z < CHUNK_DEPTH);
                assert_eq!(chunk.to_world(local_x, local_z), Some((world_x, world_z)));
            }
        }
    }

    #[test]
    fn square_neighbourhood_covers_chebyshev_ball() {
        let center = ChunkCoord::new(3, -2);
        let around: Vec<ChunkCoord> = center.square_around(2).collect();
        assert_eq!(around.len(), 25);
        assert!(around.iter().all(|c| center.chebyshev_distance(c) <= 2));
    }

    #[test]
    fn chunks_at_the_edge_of_i32_have_no_world_position() {
        let last = ChunkCoord::new(i32::MAX / 16, i32::MIN / 16);
        assert!(last.in_world());
        assert_eq!(last.to_world(15, 0), Some((i32::MAX, i32::MIN)));

        let beyond = ChunkCoord::new(i32::MAX / 16 + 1, 0);
        assert!(!beyond.in_world());
        assert_eq!(beyond.to_world(0, 0), None);
        assert_eq!(ChunkCoord::new(0, i32::MIN).to_world(0, 0), None);
    }

    #[test]
    fn square_is_clipped_at_the_world_edge() {
        let edge = ChunkCoord::containing(Point3::new(1e12, 64.0, 0.0));
        assert_eq!(edge, ChunkCoord::new(i32::MAX / 16, 0));
        let around: Vec<ChunkCoord> = edge.square_around(1).collect();
        assert_eq!(around.len(), 6);
        assert!(around.iter().all(ChunkCoord::in_world));

        let corner = ChunkCoord::new(i32::MAX, i32::MAX);
        assert_eq!(corner.square_around(2).count(), 0);
    }

    #[test]
    fn entity_positions_use_floor() {
        assert_eq!(ChunkCoord::containing(Point3::new(-0.5, 70.0, 15.9)), ChunkCoord::new(-1, 0));
    }
}
