//! Durable page-side key-value storage.
//!
//! The page keeps a single flag here, but the store is string-keyed like the
//! browser's local storage it stands in for.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PwaError, PwaResult};

/// Set once the user turns the custom install prompt down.
pub const INSTALL_PROMPT_DISMISSED: &str = "installPromptDismissed";

/// String key-value store that survives page reloads.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> PwaResult<()>;

    fn remove(&mut self, key: &str) -> PwaResult<bool>;

    /// Whether `key` holds the string `"true"`.
    fn flag(&self, key: &str) -> bool {
        self.get(key).as_deref() == Some("true")
    }
}

/// In-memory store for tests and hosts without durable storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> PwaResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PwaResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// JSON file store. Every write is flushed to disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = if !path.exists() {
            BTreeMap::new()
        } else {
            match std::fs::read_to_string(&path) {
                Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt local storage");
                    BTreeMap::new()
                }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot read local storage");
                    BTreeMap::new()
                }
            }
        };
        debug!(path = %path.display(), keys = entries.len(), "Loaded local storage");
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> PwaResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| PwaError::storage(format!("Failed to serialize local storage: {}", e)))?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> PwaResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> PwaResult<bool> {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_flag() {
        let mut store = MemoryStore::new();
        assert!(!store.flag(INSTALL_PROMPT_DISMISSED));
        store.set(INSTALL_PROMPT_DISMISSED, "true").unwrap();
        assert!(store.flag(INSTALL_PROMPT_DISMISSED));
        store.set(INSTALL_PROMPT_DISMISSED, "false").unwrap();
        assert!(!store.flag(INSTALL_PROMPT_DISMISSED));
    }

    #[test]
    fn test_file_store_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("local-storage.json");

        let mut store = FileStore::load(&path);
        store.set(INSTALL_PROMPT_DISMISSED, "true").unwrap();

        let reloaded = FileStore::load(&path);
        assert!(reloaded.flag(INSTALL_PROMPT_DISMISSED));
    }

    #[test]
    fn test_file_store_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local-storage.json");

        let mut store = FileStore::load(&path);
        store.set("theme", "dark").unwrap();
        assert!(store.remove("theme").unwrap());
        assert!(!store.remove("theme").unwrap());
        assert_eq!(FileStore::load(&path).get("theme"), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local-storage.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStore::load(&path);
        assert_eq!(store.get(INSTALL_PROMPT_DISMISSED), None);
    }
}
