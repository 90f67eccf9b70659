use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::StateStore;

pub const STATE_FILE_NAME: &str = "state.json";

/// Keeps every key in one JSON object on disk.
///
/// Sets only touch the in-memory document. [StateStore::flush] writes the whole document to a
/// temporary file and renames it over the old one, so a crash leaves either the previous or the
/// new document, never a mix. A sibling `.lock` file serializes readers and writers.
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
    dirty: bool,
}

impl JsonFileStore {
    /// Opens the store in `dir`, creating the directory if needed.
    pub fn open_in(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory {dir:?}"))?;
        Self::open(dir.join(STATE_FILE_NAME))
    }

    pub fn open(path: PathBuf) -> Result<Self> {
        let lock = Self::lock_file(&path)?;
        FileExt::lock_shared(&lock)?;
        let read = fs::read(&path);
        FileExt::unlock(&lock)?;

        let values = match read {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(values) => values,
                Err(e) => {
                    // Keep the broken document around instead of overwriting it on the next flush
                    let backup = path.with_extension("json.corrupt");
                    warn!("State file {path:?} is corrupted ({e}), moving it to {backup:?}");
                    fs::rename(&path, &backup)
                        .with_context(|| format!("Failed to move corrupted state file {path:?}"))?;
                    Map::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state file at {path:?}, starting empty");
                Map::new()
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read state file {path:?}"))?,
        };

        Ok(Self {
            path,
            values,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_file(path: &Path) -> Result<File> {
        let lock_path = path.with_extension("json.lock");
        File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {lock_path:?}"))
    }

    fn write_document(&self) -> Result<()> {
        let temporary = self.path.with_extension("json.tmp");
        let mut file = File::create(&temporary)
            .with_context(|| format!("Failed to create {temporary:?}"))?;
        serde_json::to_writer_pretty(&mut file, &self.values)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&temporary, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.values
            .get(key)
            .map(serde_json::to_vec)
            .transpose()
            .map_err(Into::into)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        let value: Value = serde_json::from_slice(&value)
            .with_context(|| format!("Value for {key} is not JSON"))?;
        self.values.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let lock = Self::lock_file(&self.path)?;
        lock.lock_exclusive()?;
        let result = self.write_document();
        FileExt::unlock(&lock)?;
        result?;
        self.dirty = false;
        debug!("Flushed state to {:?}", self.path);
        Ok(())
    }
}
