//! Key-value storage backends
//!
//! Two scopes exist: a session-scoped store that dies with the login session
//! and a persistent one that survives restarts. Which scope holds the token is
//! decided by the session layer; this module only provides the stores.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{UnmixError, UnmixResult};

/// Storage scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Lives as long as the login session
    Session,
    /// Survives restarts
    Persistent,
}

impl StorageScope {
    pub fn other(self) -> Self {
        match self {
            StorageScope::Session => StorageScope::Persistent,
            StorageScope::Persistent => StorageScope::Session,
        }
    }
}

/// String key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> UnmixResult<()>;

    fn remove(&self, key: &str) -> UnmixResult<()>;

    fn keys(&self) -> Vec<String>;

    /// Re-read from the backing medium, picking up writes by other processes.
    fn reload(&self) -> UnmixResult<()> {
        Ok(())
    }
}

// ============ Memory Store ============

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> UnmixResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> UnmixResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

// ============ File Store ============

/// JSON-file-backed store.
///
/// Every mutation rewrites the whole file through a temp file and a rename,
/// so a concurrent reader never sees a torn document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> UnmixResult<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        log::debug!("[Storage] Opened {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> UnmixResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> UnmixResult<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> UnmixResult<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    fn reload(&self) -> UnmixResult<()> {
        let fresh = read_entries(&self.path)?;
        *self.entries.write() = fresh;
        Ok(())
    }
}

fn read_entries(path: &Path) -> UnmixResult<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
            UnmixError::Serialization(format!("corrupt store {}: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}
