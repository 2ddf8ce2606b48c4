/*
    map_store.rs - The one saved world map of this device

    File layout:

        [encoded world map blob][u32 LE CRC32 of the blob]

    Writes go to a temp file next to the target, are synced, then renamed
    over it, so a crash leaves either the old map or the new one. Reads
    verify the checksum before the blob is handed to the codec.

    All calls are blocking; the session runs them on the blocking pool.
*/

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::errors::{PersistenceError, PersistenceResult};

const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Clone)]
pub struct MapStore {
    path: PathBuf,
}

impl MapStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MapStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Atomically replace the saved map with `blob`
    pub fn save(&self, blob: &[u8]) -> PersistenceResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        let checksum = crc32fast::hash(blob);

        let mut file = File::create(&temp_path).map_err(|e| self.io_error(e))?;
        file.write_all(blob).map_err(|e| self.io_error(e))?;
        file.write_all(&checksum.to_le_bytes()).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;

        info!(path = %self.path.display(), size = blob.len(), "Saved world map");
        Ok(())
    }

    /// Read the saved blob and verify its checksum
    pub fn load(&self) -> PersistenceResult<Vec<u8>> {
        let mut data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistenceError::NotFound(self.path.clone()))
            }
            Err(e) => return Err(self.io_error(e)),
        };

        if data.len() < CHECKSUM_LEN {
            return Err(PersistenceError::Corrupted {
                path: self.path.clone(),
                reason: format!("file is only {} bytes", data.len()),
            });
        }

        let split = data.len() - CHECKSUM_LEN;
        let mut stored = [0u8; CHECKSUM_LEN];
        stored.copy_from_slice(&data[split..]);
        let stored = u32::from_le_bytes(stored);
        data.truncate(split);

        let actual = crc32fast::hash(&data);
        if actual != stored {
            return Err(PersistenceError::Corrupted {
                path: self.path.clone(),
                reason: format!("checksum mismatch: stored {:08x}, computed {:08x}", stored, actual),
            });
        }

        debug!(path = %self.path.display(), size = data.len(), "Loaded world map");
        Ok(data)
    }
}
