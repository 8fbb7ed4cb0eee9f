use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

use super::error::{StorageError, StorageResult};
use super::key_value::KeyValueStore;

const NOTIFY_CAPACITY: usize = 64;

/// File-backed store: one JSON object holding every key.
///
/// Writes go through a temp file + rename so a crash never leaves a
/// half-written cache. A corrupt file on load degrades to an empty map;
/// cached state is best effort, losing it must never take the client down.
pub struct JsonFileStore {
    file_path: PathBuf,
    values: Mutex<HashMap<String, String>>,
    notify: broadcast::Sender<String>,
}

impl JsonFileStore {
    /// Open (or create) the store at an explicit path.
    pub fn open(file_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let file_path = file_path.into();
        let values = Self::load(&file_path);
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Ok(Self {
            file_path,
            values: Mutex::new(values),
            notify,
        })
    }

    /// Open the store at the default location under the user data dir.
    pub fn open_default() -> StorageResult<Self> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StorageError::Path("Cannot determine data directory".into()))?;
        Self::open(data_dir.join("eloquent").join("cache.json"))
    }

    fn load(path: &Path) -> HashMap<String, String> {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&contents) {
            Ok(values) => values,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cache file unreadable, starting empty");
                HashMap::new()
            }
        }
    }

    /// Persist the current map atomically (temp file + rename).
    fn flush(&self, values: &HashMap<String, String>) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(values)?;

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, &json)?;
        std::fs::rename(&temp_path, &self.file_path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, raw: String) {
        let mut values = self.values.lock();
        if values.get(key) == Some(&raw) {
            return;
        }
        values.insert(key.to_string(), raw);
        if let Err(err) = self.flush(&values) {
            warn!(key, error = %err, "failed to persist cache write");
        }
        drop(values);
        let _ = self.notify.send(key.to_string());
    }

    fn remove(&self, key: &str) {
        let mut values = self.values.lock();
        if values.remove(key).is_none() {
            return;
        }
        if let Err(err) = self.flush(&values) {
            warn!(key, error = %err, "failed to persist cache removal");
        }
        drop(values);
        let _ = self.notify.send(key.to_string());
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.write("chat.userId", "\"u-1\"".to_string());
        drop(store);

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.read("chat.userId").as_deref(), Some("\"u-1\""));
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{{{{").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.read("anything"), None);
    }

    #[test]
    fn missing_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("cache.json");

        let store = JsonFileStore::open(&path).unwrap();
        store.write("k", "1".to_string());
        assert!(path.exists());
    }
}
