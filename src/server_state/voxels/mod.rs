//! # Voxel World
//!
//! Everything that represents, produces and persists the block world.
//!
//! ## Architecture
//!
//! * **Block**: block ids and the palette generation places them from
//! * **Chunk**: fixed-size 16x256x16 columns of blocks and coordinate maths
//! * **Generation**: the deterministic terrain generator
//! * **Storage**: the persistent chunk and metadata tables
//! * **World**: the `WorldStore` tying cache, storage, generator and clock
//! * **Tasks**: generation work run on the worker pool
//!
//! ## Data Flow
//!
//! 1. The game server asks the world store for a chunk or block
//! 2. The store serves it from cache, storage or the generator, in that order
//! 3. Edits are applied to the cached chunk and written through to storage
//! 4. Chunks far from every player are flushed and dropped from the cache
//!
//! Only the game loop touches the world store, so none of this is
//! synchronised. Generation tasks receive a shared, immutable generator and
//! hand back finished chunks.

pub mod block;
pub mod chunk;
pub mod generation;
pub mod storage;
pub mod tasks;
pub mod world;
