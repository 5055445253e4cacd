//! Directory-backed storage.
//!
//! ```text
//! <root>/level.json          metadata table, a flat JSON object of strings
//! <root>/chunks/c.<x>.<z>.bin one bincode record per chunk
//! ```
//!
//! Every write goes to a sibling temp file which is then renamed over the
//! target, so a crash mid-write leaves the previous record intact.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::{ChunkStorage, StoreError, StoredChunk};
use crate::server_state::voxels::chunk::ChunkCoord;

const LEVEL_FILE: &str = "level.json";
const CHUNK_DIR: &str = "chunks";

/// Chunk and metadata tables kept in a world directory.
pub struct FileStorage {
    root: PathBuf,
    meta: HashMap<String, String>,
    closed: bool,
}

impl FileStorage {
    /// Opens (creating if needed) the world directory at `root`.
    ///
    /// # Errors
    /// Fails if the directories cannot be created or an existing
    /// `level.json` cannot be read or parsed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let chunk_dir = root.join(CHUNK_DIR);
        fs::create_dir_all(&chunk_dir).map_err(|err| StoreError::io(&chunk_dir, err))?;

        let level_path = root.join(LEVEL_FILE);
        let meta = match fs::read(&level_path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| StoreError::CorruptMetadata(format!("{}: {}", level_path.display(), err)))?,
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::io(level_path, err)),
        };

        info!("Opened world storage at {}", root.display());
        Ok(FileStorage {
            root,
            meta,
            closed: false,
        })
    }

    fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.root
            .join(CHUNK_DIR)
            .join(format!("c.{}.{}.bin", coord.x, coord.z))
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn write_meta(&self) -> Result<(), StoreError> {
        let path = self.root.join(LEVEL_FILE);
        let bytes = serde_json::to_vec_pretty(&self.meta)
            .map_err(|err| StoreError::CorruptMetadata(err.to_string()))?;
        write_atomically(&path, &bytes)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|err| StoreError::io(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| StoreError::io(path, err))
}

impl ChunkStorage for FileStorage {
    fn load_chunk(&mut self, coord: ChunkCoord) -> Result<Option<StoredChunk>, StoreError> {
        self.ensure_open()?;
        let path = self.chunk_path(coord);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(path, err)),
        };
        let record = bincode::deserialize(&bytes).map_err(|err| StoreError::CorruptChunk {
            coord,
            reason: err.to_string(),
        })?;
        Ok(Some(record))
    }

    fn save_chunk(&mut self, coord: ChunkCoord, chunk: &StoredChunk) -> Result<(), StoreError> {
        self.ensure_open()?;
        let bytes = bincode::serialize(chunk).map_err(|source| StoreError::Serialize { coord, source })?;
        write_atomically(&self.chunk_path(coord), &bytes)?;
        debug!("Saved chunk ({}, {}), {} bytes", coord.x, coord.z, bytes.len());
        Ok(())
    }

    fn get_meta(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        Ok(self.meta.get(key).cloned())
    }

    fn put_meta(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.meta.insert(key.to_string(), value.to_string());
        self.write_meta()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.closed {
            return Ok(());
        }
        self.write_meta()?;
        self.closed = true;
        info!("Closed world storage at {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::rle::Run;
    use crate::server_state::voxels::chunk::CHUNK_LAYER_SIZE;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("voxel-server-test-{}", uuid::Uuid::new_v4()))
    }

    fn record(block: u16) -> StoredChunk {
        StoredChunk {
            modified: true,
            blocks: vec![Run(block, 65536)],
            biomes: vec![2; CHUNK_LAYER_SIZE],
        }
    }

    #[test]
    fn chunks_and_metadata_survive_reopen() {
        let dir = scratch_dir();
        let coord = ChunkCoord::new(-3, 7);
        {
            let mut storage = FileStorage::open(&dir).unwrap();
            assert_eq!(storage.load_chunk(coord).unwrap(), None);
            storage.save_chunk(coord, &record(14)).unwrap();
            storage.put_meta("seed", "12345").unwrap();
            storage.close().unwrap();
        }

        assert!(dir.join("chunks").join("c.-3.7.bin").exists());
        let mut storage = FileStorage::open(&dir).unwrap();
        assert_eq!(storage.load_chunk(coord).unwrap(), Some(record(14)));
        assert_eq!(storage.get_meta("seed").unwrap().as_deref(), Some("12345"));
        assert_eq!(storage.get_meta("missing").unwrap(), None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn save_replaces_previous_record() {
        let dir = scratch_dir();
        let coord = ChunkCoord::new(0, 0);
        let mut storage = FileStorage::open(&dir).unwrap();
        storage.save_chunk(coord, &record(1)).unwrap();
        storage.save_chunk(coord, &record(2)).unwrap();
        assert_eq!(storage.load_chunk(coord).unwrap(), Some(record(2)));
        assert!(!dir.join("chunks").join("c.0.0.tmp").exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn garbage_chunk_file_is_corrupt() {
        let dir = scratch_dir();
        let mut storage = FileStorage::open(&dir).unwrap();
        fs::write(dir.join("chunks").join("c.1.1.bin"), b"\xff").unwrap();
        assert!(matches!(
            storage.load_chunk(ChunkCoord::new(1, 1)),
            Err(StoreError::CorruptChunk { .. })
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn closed_storage_rejects_calls() {
        let dir = scratch_dir();
        let mut storage = FileStorage::open(&dir).unwrap();
        storage.close().unwrap();
        assert!(matches!(storage.get_meta("seed"), Err(StoreError::Closed)));
        fs::remove_dir_all(dir).unwrap();
    }
}
