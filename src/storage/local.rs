use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;

use crate::{
    errors::{QuotaError, Result},
    storage::KeyValueStore,
};

type Entries = BTreeMap<String, String>;

/// Durable store keeping every key in a single JSON object on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so a crash never leaves a half-written file behind.
/// The in-process lock serialises read-modify-write cycles between handles
/// sharing this value; separate processes are not coordinated.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                QuotaError::Storage(format!("Failed to create storage directory: {}", e))
            })?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Entries::new());
        }

        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Discarding unreadable store file: {}", e);
                Ok(Entries::new())
            }
        }
    }

    fn write_entries(&self, entries: &Entries) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, entries)?;
        file.flush()?;
        file.persist(&self.path)
            .map_err(|e| QuotaError::Storage(format!("Failed to replace store file: {}", e)))?;

        Ok(())
    }

    fn modify<T>(&self, f: impl FnOnce(&mut Entries) -> (bool, T)) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        let (changed, out) = f(&mut entries);
        if changed {
            self.write_entries(&entries)?;
        }
        Ok(out)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
            (true, ())
        })
    }

    fn compare_and_swap<'a>(&self, key: &str, expected: Option<&'a str>, value: &str) -> Result<bool> {
        self.modify(|entries| {
            if entries.get(key).map(String::as_str) != expected {
                return (false, false);
            }
            entries.insert(key.to_string(), value.to_string());
            (true, true)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|entries| (entries.remove(key).is_some(), ()))
    }
}
