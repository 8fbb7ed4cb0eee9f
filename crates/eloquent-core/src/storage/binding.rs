use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use super::key_value::{KeyValueStore, get_value, set_value};

/// Reactive view of one stored key.
///
/// Holds a decoded copy of the value and a subscription to the store's
/// change channel. `poll` drains pending notifications and re-reads when a
/// matching one arrived; the re-read is idempotent (read and replace), so
/// missing an intermediate notification or handling a burst in one poll
/// both land on the same state. Multiple bindings over the same key stay
/// consistent without sharing memory.
pub struct StoredValue<T> {
    store: Arc<dyn KeyValueStore>,
    key: &'static str,
    fallback: T,
    current: T,
    changes: broadcast::Receiver<String>,
}

impl<T> StoredValue<T>
where
    T: Clone + DeserializeOwned + Serialize,
{
    pub fn new(store: Arc<dyn KeyValueStore>, key: &'static str, fallback: T) -> Self {
        let changes = store.subscribe();
        let current = get_value(store.as_ref(), key, fallback.clone());
        Self {
            store,
            key,
            fallback,
            current,
            changes,
        }
    }

    /// The value as of the last read.
    pub fn get(&self) -> &T {
        &self.current
    }

    /// Write through to the store and adopt the new value locally.
    pub fn set(&mut self, value: T) {
        set_value(self.store.as_ref(), self.key, &value);
        self.current = value;
    }

    /// Drain pending change notifications, re-reading if any matched this
    /// key. Returns whether a re-read happened.
    pub fn poll(&mut self) -> bool {
        let mut matched = false;
        loop {
            match self.changes.try_recv() {
                Ok(key) if key == self.key => matched = true,
                Ok(_) => {}
                // Overflow means notifications were dropped; re-read to be safe.
                Err(TryRecvError::Lagged(_)) => matched = true,
                Err(_) => break,
            }
        }
        if matched {
            self.refresh();
        }
        matched
    }

    /// Unconditionally re-read from the store.
    pub fn refresh(&mut self) {
        self.current = get_value(self.store.as_ref(), self.key, self.fallback.clone());
    }

    /// Wait for the next change to this key, then re-read.
    pub async fn changed(&mut self) {
        loop {
            match self.changes.recv().await {
                Ok(key) if key == self.key => break,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => break,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
        self.refresh();
    }
}
