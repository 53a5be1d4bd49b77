//! Persisted key/value slots behind the store.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Result, SyncError};

/// The persisted slots the store knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    FollowedUsers,
    OpenedGists,
    SortType,
    SortDirection,
}

impl StorageKey {
    pub const ALL: [StorageKey; 4] = [
        StorageKey::FollowedUsers,
        StorageKey::OpenedGists,
        StorageKey::SortType,
        StorageKey::SortDirection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::FollowedUsers => "followedUsers",
            StorageKey::OpenedGists => "openedEntities",
            StorageKey::SortType => "sortType",
            StorageKey::SortDirection => "sortDirection",
        }
    }

    /// List slots hold ordered string lists; the others hold one value.
    pub fn is_list(&self) -> bool {
        matches!(self, StorageKey::FollowedUsers | StorageKey::OpenedGists)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        StorageKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SyncError::configuration(format!("unsupported storage key: {}", s)))
    }
}

/// Synchronous key/value persistence.
///
/// A `set` or `delete` is fully applied before it returns; readers never
/// observe a partially written value.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local storage; nothing survives the session.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Storage kept in a single JSON object file.
///
/// Every write rewrites the whole file through a sibling temp file and a
/// rename.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl JsonFileStorage {
    /// Open (or lazily create) the state file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    /// Default location: `<data_dir>/gist-tree/state.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("gist-tree").join("state.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StorageBackend for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}
