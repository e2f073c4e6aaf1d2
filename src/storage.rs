// Key/value persistence for the small records the client keeps between runs.
use crate::{
    error::StorageError,
    sync::lock,
};
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tracing::warn;

pub const WINS_KEY: &str = "dice_game_wins";
pub const AUTOPLAY_CREDENTIALS_KEY: &str = "dice_game_ai_credentials";
pub const SECOND_SEAT_KEY: &str = "dice_game_player2_auth";

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    fn clear(&self, key: &str) -> StorageResult<()>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Reads `key` as JSON. Missing or unreadable entries come back as `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(%key, ?err, "failed to read stored value");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%key, ?err, "discarding malformed stored value");
            None
        }
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| StorageError(format!("failed to encode {key}: {e}")))?;
    store.set(key, &raw)
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        lock(&self.entries).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Whole-file JSON object store. Every write rewrites the file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        if !path.exists() {
            write_entries(&path, &BTreeMap::new())?;
        }
        Ok(Self {
            path,
            guard: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = lock(&self.guard);
        Ok(read_entries(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = lock(&self.guard);
        let mut entries = read_entries(&self.path)?;
        entries.insert(key.to_string(), value.to_string());
        write_entries(&self.path, &entries)
    }

    fn clear(&self, key: &str) -> StorageResult<()> {
        let _guard = lock(&self.guard);
        let mut entries = read_entries(&self.path)?;
        if entries.remove(key).is_some() {
            write_entries(&self.path, &entries)?;
        }
        Ok(())
    }
}

fn read_entries(path: &Path) -> StorageResult<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path)
        .map_err(|e| StorageError(format!("failed to read {}: {e}", path.display())))?;
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&contents)
        .map_err(|e| StorageError(format!("failed to parse {}: {e}", path.display())))
}

fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| StorageError(format!("failed to encode store: {e}")))?;
    let mut file = fs::File::create(path)
        .map_err(|e| StorageError(format!("failed to write {}: {e}", path.display())))?;
    file.write_all(json.as_bytes())
        .map_err(|e| StorageError(format!("failed to write {}: {e}", path.display())))
}
