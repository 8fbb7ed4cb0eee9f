use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::key_value::KeyValueStore;

const NOTIFY_CAPACITY: usize = 64;

/// In-memory store. Backs guest sessions and tests as the swappable fake
/// for anything written against [`KeyValueStore`].
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    notify: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            values: Mutex::new(HashMap::new()),
            notify,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn write(&self, key: &str, raw: String) {
        let mut values = self.values.lock();
        if values.get(key) == Some(&raw) {
            return;
        }
        values.insert(key.to_string(), raw);
        drop(values);
        let _ = self.notify.send(key.to_string());
    }

    fn remove(&self, key: &str) {
        let removed = self.values.lock().remove(key).is_some();
        if removed {
            let _ = self.notify.send(key.to_string());
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.notify.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifies_only_when_the_stored_text_changes() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe();

        store.write("k", "\"a\"".to_string());
        store.write("k", "\"a\"".to_string()); // unchanged, no event
        store.write("k", "\"b\"".to_string());

        assert_eq!(rx.try_recv().unwrap(), "k");
        assert_eq!(rx.try_recv().unwrap(), "k");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn remove_notifies_once() {
        let store = MemoryStore::new();
        store.write("k", "1".to_string());
        let mut rx = store.subscribe();

        store.remove("k");
        store.remove("k");

        assert_eq!(rx.try_recv().unwrap(), "k");
        assert!(rx.try_recv().is_err());
    }
}
