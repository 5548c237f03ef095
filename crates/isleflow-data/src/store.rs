//! File-backed key-value store.
//!
//! Wraps a [`MemoryStore`] and persists it as a JSON object. Writes stay in
//! memory until [`FileStore::flush`].

use std::path::{Path, PathBuf};

use isleflow_core::persist::{KeyValueStore, MemoryStore};
use tracing::debug;

/// Errors raised while reading or writing the backing file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store file {file}: {source}")]
    Json {
        file: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A [`KeyValueStore`] persisted to a JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: MemoryStore,
    dirty: bool,
}

impl FileStore {
    /// Open `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                file: path.clone(),
                source,
            })?
        } else {
            MemoryStore::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "store opened");
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are writes not yet flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write every entry to the backing file.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| StoreError::Json {
            file: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json)?;
        self.dirty = false;
        debug!(path = %self.path.display(), entries = self.entries.len(), "store flushed");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key)
    }

    fn set(&mut self, key: &str, value: String) {
        if self.entries.get(key).as_deref() != Some(value.as_str()) {
            self.entries.set(key, value);
            self.dirty = true;
        }
    }

    fn remove(&mut self, key: &str) {
        if self.entries.get(key).is_some() {
            self.entries.remove(key);
            self.dirty = true;
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_test_path(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "isleflow_store_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("store.json")
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn open_missing_file_is_empty() {
        let path = make_test_path("missing");
        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().is_empty());
        assert!(!store.is_dirty());
        cleanup(&path);
    }

    #[test]
    fn flush_and_reopen() {
        let path = make_test_path("reopen");
        let mut store = FileStore::open(&path).unwrap();
        store.set("11.buildings.constructed", "2".to_string());
        store.set("tradeRoutes", "[]".to_string());
        assert!(store.is_dirty());
        store.flush().unwrap();
        assert!(!store.is_dirty());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("11.buildings.constructed").as_deref(), Some("2"));
        assert_eq!(reopened.keys().len(), 2);
        cleanup(&path);
    }

    #[test]
    fn unchanged_write_stays_clean() {
        let path = make_test_path("clean");
        let mut store = FileStore::open(&path).unwrap();
        store.set("a", "1".to_string());
        store.flush().unwrap();
        store.set("a", "1".to_string());
        store.remove("missing");
        assert!(!store.is_dirty());
        cleanup(&path);
    }

    #[test]
    fn corrupt_file_reports_path() {
        let path = make_test_path("corrupt");
        fs::write(&path, "{ not json").unwrap();
        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
        assert!(format!("{err}").contains("store.json"));
        cleanup(&path);
    }
}
