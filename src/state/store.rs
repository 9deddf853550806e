// State Stores - key/value persistence behind the dedup and escalation layers
// MemoryStore for tests and ephemeral runs, JsonFileStore for real deployments

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::errors::StoreError;

/// Keyed JSON document storage. Reads are infallible (backed by an in-memory
/// map); writes report persistence failures so callers can decide whether to
/// fail open.
pub trait StateStore: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Option<Value>;

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Insert only when the key is vacant. Returns true when the value was
    /// inserted. The check and the insert happen under one lock.
    fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError>;

    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys starting with `prefix`, for cooldown scans and cleanup sweeps.
    /// The empty prefix lists every key.
    fn keys_with_prefix(&self, prefix: &str) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn StateStore>;

// ============================================================================
// MEMORY STORE
// ============================================================================

/// Purely in-memory store. State does not survive a restart.
pub struct MemoryStore {
    name: String,
    map: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: Mutex::new(HashMap::new()),
        }
    }
}

impl StateStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.map.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let mut map = self.map.lock();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value);
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.map.lock().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.map.lock().len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// JSON FILE STORE
// ============================================================================

/// Write-through store backed by one pretty-printed JSON file. The whole map
/// loads at open; every mutation rewrites the file under the lock, writing a
/// sibling temp file first and renaming it into place so a crash mid-write
/// never truncates the live file.
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    map: Mutex<HashMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`, creating parent directories as needed.
    /// A missing file starts empty; an unreadable one is logged and
    /// discarded so a corrupt state file never blocks startup.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let name = name.into();
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let map = if path.exists() {
            match Self::load(&path) {
                Ok(map) => {
                    info!(
                        "state store '{}' loaded {} entries from {}",
                        name,
                        map.len(),
                        path.display()
                    );
                    map
                }
                Err(e) => {
                    warn!(
                        "state store '{}' could not read {}: {} (starting empty)",
                        name,
                        path.display(),
                        e
                    );
                    HashMap::new()
                }
            }
        } else {
            debug!(
                "state store '{}' has no file at {} yet",
                name,
                path.display()
            );
            HashMap::new()
        };

        Ok(Self {
            name,
            path,
            map: Mutex::new(map),
        })
    }

    fn load(path: &Path) -> Result<HashMap<String, Value>, StoreError> {
        let content = fs::read_to_string(path)?;
        let map = serde_json::from_str(&content)?;
        Ok(map)
    }

    fn persist(&self, map: &HashMap<String, Value>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.map.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.map.lock();
        map.insert(key.to_string(), value);
        self.persist(&map)
    }

    fn put_if_absent(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let mut map = self.map.lock();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value);
        self.persist(&map)?;
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut map = self.map.lock();
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.persist(&map)?;
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.map
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.map.lock().len()
    }

    fn flush(&self) -> Result<(), StoreError> {
        let map = self.map.lock();
        self.persist(&map)
    }
}

// ============================================================================
// TESTS
// ============================================================================
