//! # World Module
//!
//! This module provides the `WorldStore`, the single owner of a world's chunk
//! cache, persistent storage, generator and clock.
//!
//! ## Chunk lifecycle
//!
//! A chunk enters the cache on first access: it is loaded from storage when a
//! record exists, otherwise generated and persisted immediately. Once any
//! player has seen a chunk it is never regenerated differently, even after it
//! is evicted.
//!
//! Block edits go through [`WorldStore::set_block`], which writes the chunk
//! back to storage before returning. A chunk whose persist failed stays dirty
//! and is retried by the next flush; it is never evicted while dirty.
//!
//! ## Clock
//!
//! `tick()` advances a monotonic world age and a time of day cycling through
//! [`DAY_LENGTH`] ticks. Both are written to the metadata table every
//! `metadata_save_interval` ticks and on close.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use super::block::{BlockId, AIR};
use super::chunk::{Chunk, ChunkCoord, CHUNK_HEIGHT};
use super::generation::WorldGenerator;
use super::storage::{
    ChunkStorage, FileStorage, StoreError, StoredChunk, META_SEED, META_TIME_OF_DAY, META_WORLD_AGE,
};
use super::tasks::ChunkGenerationTask;
use crate::server_state::task_management::TaskManager;

/// Ticks in one full day/night cycle.
pub const DAY_LENGTH: u64 = 24_000;

/// Policy knobs of a [`WorldStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct WorldOptions {
    /// Chunks farther than `render_distance + eviction_margin` from every
    /// player are evicted.
    pub eviction_margin: u32,
    /// World age and time of day are persisted every this many ticks.
    pub metadata_save_interval: u64,
    /// Threads in the generation pool.
    pub generation_workers: usize,
}

impl Default for WorldOptions {
    fn default() -> Self {
        WorldOptions {
            eviction_margin: 2,
            metadata_save_interval: 100,
            generation_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Outcome of reading one chunk record.
enum Loaded {
    Stored(Chunk, bool),
    Missing,
    /// The record was read but does not decode into a chunk. The chunk is
    /// regenerated clean so the record is only replaced by a later edit.
    Corrupt,
}

/// A named, seeded world: chunk cache, storage, generator and clock.
pub struct WorldStore {
    name: String,
    generator: Arc<WorldGenerator>,
    storage: Box<dyn ChunkStorage>,
    /// At most one `Chunk` per coordinate.
    chunks: HashMap<ChunkCoord, Chunk>,
    /// Chunks that differ from what the generator produces.
    modified: HashSet<ChunkCoord>,
    /// Chunks generated since the last `take_generated()`.
    generated: Vec<ChunkCoord>,
    world_age: u64,
    time_of_day: u64,
    options: WorldOptions,
    task_manager: TaskManager<Chunk>,
}

fn parse_meta<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, StoreError> {
    value
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| StoreError::CorruptMetadata(format!("{key} = {raw:?}")))
        })
        .transpose()
}

impl WorldStore {
    /// Opens a world on top of `storage`.
    ///
    /// A seed already persisted in the metadata table always wins; `seed` is
    /// only used for a new world, and a new world without one gets a random
    /// seed. The chosen seed is written before this returns.
    ///
    /// # Errors
    /// Any storage failure, or unparsable metadata. The server treats both as
    /// fatal at startup.
    pub fn open(
        name: impl Into<String>,
        seed: Option<u32>,
        mut storage: Box<dyn ChunkStorage>,
        options: WorldOptions,
    ) -> Result<Self, StoreError> {
        let name = name.into();

        let stored_seed: Option<u32> = parse_meta(META_SEED, storage.get_meta(META_SEED)?)?;
        let seed = match stored_seed {
            Some(stored) => {
                if let Some(requested) = seed.filter(|&requested| requested != stored) {
                    warn!(
                        "World '{}' already has seed {}, ignoring requested seed {}",
                        name, stored, requested
                    );
                }
                stored
            }
            None => {
                let seed = seed.unwrap_or_else(|| fastrand::u32(..));
                storage.put_meta(META_SEED, &seed.to_string())?;
                seed
            }
        };

        let world_age: u64 = parse_meta(META_WORLD_AGE, storage.get_meta(META_WORLD_AGE)?)?.unwrap_or(0);
        let time_of_day: u64 = parse_meta(META_TIME_OF_DAY, storage.get_meta(META_TIME_OF_DAY)?)?.unwrap_or(0);

        info!(
            "Opened world '{}' (seed {}, age {}, time {})",
            name, seed, world_age, time_of_day
        );

        Ok(WorldStore {
            name,
            generator: Arc::new(WorldGenerator::with_defaults(seed)),
            storage,
            chunks: HashMap::new(),
            modified: HashSet::new(),
            generated: Vec::new(),
            world_age,
            time_of_day: time_of_day % DAY_LENGTH,
            task_manager: TaskManager::new(options.generation_workers),
            options,
        })
    }

    /// Opens (or creates) the world `name` under `world_dir` with file storage.
    pub fn open_in_directory(
        world_dir: &Path,
        name: &str,
        seed: Option<u32>,
        options: WorldOptions,
    ) -> Result<Self, StoreError> {
        let storage = FileStorage::open(world_dir.join(name))?;
        Self::open(name, seed, Box::new(storage), options)
    }

    /// The world's name, also its directory under the world root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The seed every chunk of this world is generated from.
    pub fn seed(&self) -> u32 {
        self.generator.seed()
    }

    /// Ticks since the world was created.
    pub fn world_age(&self) -> u64 {
        self.world_age
    }

    /// Position in the day cycle, in `0..DAY_LENGTH`.
    pub fn time_of_day(&self) -> u64 {
        self.time_of_day
    }

    /// The shared generator, as handed to generation tasks.
    pub fn generator(&self) -> &Arc<WorldGenerator> {
        &self.generator
    }

    /// Number of chunks currently cached.
    pub fn loaded_chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether `coord` is cached.
    ///
    /// # Arguments
    /// * `coord` - The chunk to look up. Never triggers a load.
    pub fn is_loaded(&self, coord: ChunkCoord) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Coordinates of chunks generated since the last call, oldest first.
    pub fn take_generated(&mut self) -> Vec<ChunkCoord> {
        std::mem::take(&mut self.generated)
    }

    /// Returns the chunk at `coord`, loading or generating it if needed.
    ///
    /// # Errors
    /// The storage could not be read. Nothing is cached in that case, so the
    /// next call tries the storage again.
    pub fn get_chunk(&mut self, coord: ChunkCoord) -> Result<&Chunk, StoreError> {
        self.chunk_mut(coord).map(|chunk| &*chunk)
    }

    fn chunk_mut(&mut self, coord: ChunkCoord) -> Result<&mut Chunk, StoreError> {
        let WorldStore {
            chunks,
            storage,
            generator,
            generated,
            modified,
            ..
        } = self;
        let entry = match chunks.entry(coord) {
            Entry::Occupied(entry) => return Ok(entry.into_mut()),
            Entry::Vacant(entry) => entry,
        };

        let chunk = match Self::load(storage.as_mut(), coord)? {
            Loaded::Stored(chunk, was_modified) => {
                if was_modified {
                    modified.insert(coord);
                }
                chunk
            }
            Loaded::Missing => {
                let mut chunk = generator.generate(coord);
                generated.push(coord);
                Self::persist(storage.as_mut(), &mut chunk, false);
                chunk
            }
            Loaded::Corrupt => {
                let mut chunk = generator.generate(coord);
                generated.push(coord);
                chunk.mark_clean();
                chunk
            }
        };
        Ok(entry.insert(chunk))
    }

    fn load(storage: &mut dyn ChunkStorage, coord: ChunkCoord) -> Result<Loaded, StoreError> {
        let loaded = match storage.load_chunk(coord) {
            Ok(Some(record)) => {
                let modified = record.modified;
                match record.into_chunk(coord) {
                    Ok(chunk) => {
                        debug!("Loaded chunk ({}, {}) from storage", coord.x, coord.z);
                        Loaded::Stored(chunk, modified)
                    }
                    Err(err) => {
                        warn!("Regenerating unreadable chunk ({}, {}): {}", coord.x, coord.z, err);
                        Loaded::Corrupt
                    }
                }
            }
            Ok(None) => Loaded::Missing,
            Err(err) => {
                warn!("Failed to load chunk ({}, {}): {}", coord.x, coord.z, err);
                return Err(err);
            }
        };
        Ok(loaded)
    }

    /// Writes one chunk. Marks it clean on success, leaves it dirty on failure.
    fn persist(storage: &mut dyn ChunkStorage, chunk: &mut Chunk, modified: bool) -> bool {
        let coord = chunk.coord();
        match storage.save_chunk(coord, &StoredChunk::from_chunk(chunk, modified)) {
            Ok(()) => {
                chunk.mark_clean();
                true
            }
            Err(err) => {
                warn!("Failed to persist chunk ({}, {}): {}", coord.x, coord.z, err);
                false
            }
        }
    }

    fn persist_cached(&mut self, coord: ChunkCoord) -> bool {
        let modified = self.modified.contains(&coord);
        match self.chunks.get_mut(&coord) {
            Some(chunk) if chunk.is_dirty() => Self::persist(self.storage.as_mut(), chunk, modified),
            _ => true,
        }
    }

    /// Makes every chunk in `coords` resident.
    ///
    /// Stored chunks are loaded inline. The rest are generated in parallel on
    /// the worker pool and this call waits for all of them, so no partially
    /// generated chunk is ever observable. A chunk whose record cannot be
    /// read is left unloaded and skipped.
    pub fn prefetch(&mut self, coords: impl IntoIterator<Item = ChunkCoord>) {
        let mut missing = Vec::new();
        let mut corrupt = HashSet::new();
        for coord in coords {
            if self.chunks.contains_key(&coord) || missing.contains(&coord) {
                continue;
            }
            match Self::load(self.storage.as_mut(), coord) {
                Ok(Loaded::Stored(chunk, was_modified)) => {
                    if was_modified {
                        self.modified.insert(coord);
                    }
                    self.chunks.insert(coord, chunk);
                }
                Ok(Loaded::Missing) => missing.push(coord),
                Ok(Loaded::Corrupt) => {
                    corrupt.insert(coord);
                    missing.push(coord);
                }
                Err(_) => {}
            }
        }

        if missing.is_empty() {
            return;
        }

        debug!("Generating {} chunks on the worker pool", missing.len());
        for &coord in &missing {
            self.task_manager
                .publish_task(Box::new(ChunkGenerationTask::new(self.generator.clone(), coord)));
        }

        for mut chunk in self.task_manager.wait_for_all() {
            let coord = chunk.coord();
            if self.chunks.contains_key(&coord) {
                continue;
            }
            if corrupt.contains(&coord) {
                chunk.mark_clean();
            } else {
                Self::persist(self.storage.as_mut(), &mut chunk, false);
            }
            self.generated.push(coord);
            self.chunks.insert(coord, chunk);
        }
    }

    /// Reads a block by world coordinates. Air outside `0..256` in y.
    ///
    /// # Errors
    /// The chunk was not cached and its record could not be read.
    pub fn get_block(&mut self, world_x: i32, world_y: i32, world_z: i32) -> Result<BlockId, StoreError> {
        if !(0..CHUNK_HEIGHT as i32).contains(&world_y) {
            return Ok(AIR);
        }
        let (coord, local_x, local_z) = ChunkCoord::from_world(world_x, world_z);
        Ok(self.chunk_mut(coord)?.get(local_x as i32, world_y, local_z as i32))
    }

    /// Writes a block by world coordinates and persists its chunk.
    ///
    /// # Returns
    /// `Ok(false)` when y lies outside `0..256`. A failed persist still
    /// returns `Ok(true)`: the edit is applied in memory and the chunk stays
    /// dirty.
    ///
    /// # Errors
    /// The chunk was not cached and its record could not be read. The edit
    /// is not applied.
    pub fn set_block(&mut self, world_x: i32, world_y: i32, world_z: i32, block: BlockId) -> Result<bool, StoreError> {
        if !(0..CHUNK_HEIGHT as i32).contains(&world_y) {
            return Ok(false);
        }
        let (coord, local_x, local_z) = ChunkCoord::from_world(world_x, world_z);
        if !self.chunk_mut(coord)?.set(local_x as i32, world_y, local_z as i32, block) {
            return Ok(false);
        }
        self.modified.insert(coord);
        self.persist_cached(coord);
        Ok(true)
    }

    /// Y of the highest non-air block in a world column.
    pub fn highest_block_y(&mut self, world_x: i32, world_z: i32) -> Result<Option<i32>, StoreError> {
        let (coord, local_x, local_z) = ChunkCoord::from_world(world_x, world_z);
        Ok(self.chunk_mut(coord)?.highest_block_y(local_x as i32, local_z as i32))
    }

    /// Evicts every cached chunk farther than `render_distance` plus the
    /// eviction margin (Chebyshev distance) from all `players`. With no
    /// players every chunk qualifies.
    ///
    /// Dirty chunks are persisted first; one that fails to persist stays
    /// cached.
    ///
    /// # Returns
    /// The number of chunks evicted.
    pub fn unload_distant_chunks(&mut self, players: &[ChunkCoord], render_distance: u32) -> usize {
        let limit = render_distance.saturating_add(self.options.eviction_margin);
        let distant: Vec<ChunkCoord> = self
            .chunks
            .keys()
            .filter(|coord| players.iter().all(|player| coord.chebyshev_distance(player) > limit))
            .copied()
            .collect();

        let mut evicted = 0;
        for coord in distant {
            if !self.persist_cached(coord) {
                continue;
            }
            self.chunks.remove(&coord);
            self.modified.remove(&coord);
            evicted += 1;
        }
        if evicted > 0 {
            debug!("Evicted {} chunks, {} remain", evicted, self.chunks.len());
        }
        evicted
    }

    /// Advances the world clock by one tick.
    pub fn tick(&mut self) {
        self.world_age += 1;
        self.time_of_day = (self.time_of_day + 1) % DAY_LENGTH;

        let interval = self.options.metadata_save_interval.max(1);
        if self.world_age % interval == 0 {
            if let Err(err) = self.save_metadata() {
                warn!("Failed to save world metadata: {}", err);
            }
        }
    }

    /// Writes world age and time of day to the metadata table.
    pub fn save_metadata(&mut self) -> Result<(), StoreError> {
        self.storage.put_meta(META_WORLD_AGE, &self.world_age.to_string())?;
        self.storage.put_meta(META_TIME_OF_DAY, &self.time_of_day.to_string())
    }

    /// Persists every dirty cached chunk.
    ///
    /// # Errors
    /// [`StoreError::Unsaved`] with the number of chunks still dirty. Each
    /// failure is also logged.
    pub fn save_all(&mut self) -> Result<(), StoreError> {
        let dirty: Vec<ChunkCoord> = self
            .chunks
            .values()
            .filter(|chunk| chunk.is_dirty())
            .map(Chunk::coord)
            .collect();
        let failed = dirty.into_iter().filter(|&coord| !self.persist_cached(coord)).count();
        if failed > 0 {
            return Err(StoreError::Unsaved(failed));
        }
        Ok(())
    }

    /// Flushes all chunks and metadata, then releases the storage.
    pub fn close(mut self) -> Result<(), StoreError> {
        let chunks = self.save_all();
        let metadata = self.save_metadata();
        let closed = self.storage.close();
        info!("Closed world '{}' at age {}", self.name, self.world_age);
        chunks.and(metadata).and(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::voxels::storage::MemoryStorage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Memory storage that stays inspectable after being boxed into a world
    /// and can be told to fail chunk writes, or the next few chunk reads.
    #[derive(Clone, Default)]
    struct SharedStorage {
        inner: Arc<Mutex<MemoryStorage>>,
        fail_saves: Arc<AtomicBool>,
        failing_loads: Arc<AtomicUsize>,
    }

    fn disk_error(message: &str) -> StoreError {
        StoreError::io("disk", std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
    }

    impl ChunkStorage for SharedStorage {
        fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<StoredChunk>, StoreError> {
            let failing = self.failing_loads.load(Ordering::SeqCst);
            if failing > 0 {
                self.failing_loads.store(failing - 1, Ordering::SeqCst);
                return Err(disk_error("read interrupted"));
            }
            self.inner.lock().unwrap().load_chunk(coord)
        }

        fn save_chunk(&mut self, coord: ChunkCoord, chunk: &StoredChunk) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(disk_error("disk full"));
            }
            self.inner.lock().unwrap().save_chunk(coord, chunk)
        }

        fn get_meta(&mut self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.lock().unwrap().get_meta(key)
        }

        fn put_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.lock().unwrap().put_meta(key, value)
        }

        fn close(&mut self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn options() -> WorldOptions {
        WorldOptions {
            generation_workers: 2,
            ..WorldOptions::default()
        }
    }

    fn open_world(storage: &SharedStorage, seed: Option<u32>) -> WorldStore {
        WorldStore::open("test", seed, Box::new(storage.clone()), options()).unwrap()
    }

    #[test]
    fn first_visit_generates_and_persists() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(12345));
        let coord = ChunkCoord::new(2, -1);

        let chunk = world.get_chunk(coord).unwrap().clone();
        assert!(chunk.is_generated());
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.blocks(), world.generator().generate(coord).blocks());
        assert_eq!(world.take_generated(), vec![coord]);

        let record = storage.inner.lock().unwrap().load_chunk(coord).unwrap().unwrap();
        assert!(!record.modified);

        world.get_chunk(coord).unwrap();
        assert!(world.take_generated().is_empty());
    }

    #[test]
    fn set_block_handles_negative_coordinates_and_writes_through() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(7));

        assert!(world.set_block(-5, 64, -20, 14).unwrap());
        assert_eq!(world.get_block(-5, 64, -20).unwrap(), 14);

        let record = storage
            .inner
            .lock()
            .unwrap()
            .load_chunk(ChunkCoord::new(-1, -2))
            .unwrap()
            .unwrap();
        assert!(record.modified);
        let chunk = record.into_chunk(ChunkCoord::new(-1, -2)).unwrap();
        assert_eq!(chunk.get(11, 64, 12), 14);
    }

    #[test]
    fn out_of_range_height_never_loads_a_chunk() {
        let mut world = open_world(&SharedStorage::default(), Some(1));
        assert_eq!(world.get_block(0, -1, 0).unwrap(), AIR);
        assert_eq!(world.get_block(0, 256, 0).unwrap(), AIR);
        assert!(!world.set_block(0, 256, 0, 14).unwrap());
        assert_eq!(world.loaded_chunk_count(), 0);
    }

    #[test]
    fn evicted_chunk_comes_back_identical() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(12345));
        world.set_block(40, 100, 40, 182).unwrap();
        let coord = ChunkCoord::new(2, 2);
        let before = world.get_chunk(coord).unwrap().clone();
        assert_eq!(world.take_generated(), vec![coord]);

        let evicted = world.unload_distant_chunks(&[ChunkCoord::new(100, 100)], 4);
        assert_eq!(evicted, 1);
        assert!(!world.is_loaded(coord));

        assert_eq!(world.get_chunk(coord).unwrap().blocks(), before.blocks());
        assert!(world.take_generated().is_empty(), "reloaded, not regenerated");
    }

    #[test]
    fn eviction_keeps_chunks_near_any_player() {
        let mut world = open_world(&SharedStorage::default(), Some(3));
        world.prefetch(ChunkCoord::new(0, 0).square_around(7));
        assert_eq!(world.loaded_chunk_count(), 225);

        world.unload_distant_chunks(&[ChunkCoord::new(0, 0)], 4);
        assert_eq!(world.loaded_chunk_count(), 13 * 13);
        assert!(world.is_loaded(ChunkCoord::new(6, -6)));
        assert!(!world.is_loaded(ChunkCoord::new(7, 0)));

        world.unload_distant_chunks(&[], 4);
        assert_eq!(world.loaded_chunk_count(), 0);
    }

    #[test]
    fn failed_persist_keeps_chunk_dirty_and_resident() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(9));
        world.get_chunk(ChunkCoord::new(0, 0)).unwrap();

        storage.fail_saves.store(true, Ordering::SeqCst);
        assert!(world.set_block(1, 90, 1, 182).unwrap());
        assert!(world.get_chunk(ChunkCoord::new(0, 0)).unwrap().is_dirty());
        assert_eq!(world.unload_distant_chunks(&[], 4), 0);
        assert!(matches!(world.save_all(), Err(StoreError::Unsaved(1))));

        storage.fail_saves.store(false, Ordering::SeqCst);
        assert_eq!(world.unload_distant_chunks(&[], 4), 1);
        assert_eq!(world.get_block(1, 90, 1).unwrap(), 182);
    }

    #[test]
    fn read_error_never_replaces_stored_edits() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(12345));
        assert!(world.set_block(1, 100, 1, 7).unwrap());
        world.save_all().unwrap();
        assert_eq!(world.unload_distant_chunks(&[], 4), 1);
        world.take_generated();

        storage.failing_loads.store(1, Ordering::SeqCst);
        assert!(world.get_block(1, 100, 1).is_err());
        assert!(!world.is_loaded(ChunkCoord::new(0, 0)));
        assert!(world.take_generated().is_empty());

        assert_eq!(world.get_block(1, 100, 1).unwrap(), 7);
        assert!(world.set_block(2, 100, 2, 7).unwrap());
        world.close().unwrap();

        let mut world = open_world(&storage, None);
        assert_eq!(world.get_block(1, 100, 1).unwrap(), 7);
        assert_eq!(world.get_block(2, 100, 2).unwrap(), 7);
    }

    #[test]
    fn failed_edit_leaves_the_chunk_unloaded() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(3));
        world.get_chunk(ChunkCoord::new(0, 0)).unwrap();
        world.unload_distant_chunks(&[], 4);

        storage.failing_loads.store(1, Ordering::SeqCst);
        assert!(world.set_block(5, 100, 5, 7).is_err());
        assert!(!world.is_loaded(ChunkCoord::new(0, 0)));
        assert_ne!(world.get_block(5, 100, 5).unwrap(), 7);
    }

    #[test]
    fn prefetch_skips_chunks_it_cannot_read() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(4));
        world.set_block(0, 100, 0, 7).unwrap();
        world.unload_distant_chunks(&[], 4);

        storage.failing_loads.store(1, Ordering::SeqCst);
        world.prefetch([ChunkCoord::new(0, 0), ChunkCoord::new(1, 0)]);
        assert!(!world.is_loaded(ChunkCoord::new(0, 0)));
        assert!(world.is_loaded(ChunkCoord::new(1, 0)));
        assert_eq!(world.get_block(0, 100, 0).unwrap(), 7);
    }

    #[test]
    fn corrupt_record_is_regenerated_but_not_overwritten() {
        let storage = SharedStorage::default();
        let coord = ChunkCoord::new(0, 0);
        storage
            .inner
            .lock()
            .unwrap()
            .save_chunk(
                coord,
                &StoredChunk {
                    modified: true,
                    blocks: vec![crate::codec::rle::Run(7, 10)],
                    biomes: Vec::new(),
                },
            )
            .unwrap();

        let mut world = open_world(&storage, Some(6));
        let expected = world.generator().generate(coord);
        assert_eq!(world.get_chunk(coord).unwrap().blocks(), expected.blocks());
        assert_eq!(world.take_generated(), vec![coord]);
        assert!(world.save_all().is_ok());

        let record = storage.inner.lock().unwrap().load_chunk(coord).unwrap().unwrap();
        assert_eq!(record.blocks, vec![crate::codec::rle::Run(7, 10)]);
    }

    #[test]
    fn persisted_seed_is_immutable() {
        let storage = SharedStorage::default();
        let world = open_world(&storage, Some(111));
        world.close().unwrap();

        let world = open_world(&storage, Some(222));
        assert_eq!(world.seed(), 111);
    }

    #[test]
    fn new_world_without_seed_records_a_random_one() {
        let storage = SharedStorage::default();
        let world = open_world(&storage, None);
        let stored = storage.inner.lock().unwrap().get_meta(META_SEED).unwrap();
        assert_eq!(stored, Some(world.seed().to_string()));
    }

    #[test]
    fn metadata_is_saved_on_the_interval() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(5));
        for _ in 0..99 {
            world.tick();
        }
        assert_eq!(storage.inner.lock().unwrap().get_meta(META_WORLD_AGE).unwrap(), None);
        world.tick();
        assert_eq!(
            storage.inner.lock().unwrap().get_meta(META_WORLD_AGE).unwrap().as_deref(),
            Some("100")
        );
    }

    #[test]
    fn time_of_day_wraps_and_clock_survives_reopen() {
        let storage = SharedStorage::default();
        let mut world = open_world(&storage, Some(5));
        for _ in 0..DAY_LENGTH + 1 {
            world.tick();
        }
        assert_eq!(world.world_age(), DAY_LENGTH + 1);
        assert_eq!(world.time_of_day(), 1);
        world.close().unwrap();

        let world = open_world(&storage, None);
        assert_eq!(world.world_age(), DAY_LENGTH + 1);
        assert_eq!(world.time_of_day(), 1);
    }

    #[test]
    fn corrupt_metadata_fails_to_open() {
        let storage = SharedStorage::default();
        storage.inner.lock().unwrap().put_meta(META_SEED, "not-a-seed").unwrap();
        let result = WorldStore::open("test", None, Box::new(storage), options());
        assert!(matches!(result, Err(StoreError::CorruptMetadata(_))));
    }

    #[test]
    fn prefetch_matches_lazy_generation() {
        let mut world = open_world(&SharedStorage::default(), Some(12345));
        let coords: Vec<ChunkCoord> = ChunkCoord::new(-2, 3).square_around(1).collect();
        world.prefetch(coords.clone());
        assert_eq!(world.loaded_chunk_count(), coords.len());
        let mut generated = world.take_generated();
        generated.sort();
        let mut expected = coords.clone();
        expected.sort();
        assert_eq!(generated, expected);

        for coord in coords {
            let expected = world.generator().generate(coord);
            let chunk = world.get_chunk(coord).unwrap();
            assert!(!chunk.is_dirty());
            assert_eq!(chunk.blocks(), expected.blocks());
        }
    }
}
