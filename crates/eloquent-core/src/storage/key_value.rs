use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::warn;

/// Namespaced keys for everything the client persists locally.
pub mod keys {
    /// Current conversation pointer; absent/null means "new, not created".
    pub const CURRENT_CONVERSATION_ID: &str = "chat.currentConversationId";
    /// Cached list of conversation summaries, most-recently-active first.
    pub const CONVERSATION_SUMMARIES: &str = "chat.conversationSummaries";
    pub const USER_ID: &str = "chat.userId";
    pub const GUEST_MODE: &str = "chat.guestMode";
    pub const USER_PROFILE: &str = "chat.userProfile";
    pub const AUTH_TOKEN: &str = "chat.authToken";
}

/// A persistent string-to-string store with change notification.
///
/// Implementations broadcast the key of every write that actually changed
/// the stored serialization, so bindings over the same store stay
/// consistent without a shared in-memory state. Values are stored as raw
/// JSON text; typed access goes through [`get_value`]/[`set_value`].
pub trait KeyValueStore: Send + Sync {
    /// Raw stored text for a key, if any.
    fn read(&self, key: &str) -> Option<String>;

    /// Store raw text under a key, notifying subscribers when it differs
    /// from what is currently stored.
    fn write(&self, key: &str, raw: String);

    /// Remove a key (notifies subscribers when something was removed).
    fn remove(&self, key: &str);

    /// Subscribe to change notifications; each message is the changed key.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// Read and decode a stored value, returning `fallback` on absence or
/// decode failure. Never errors: cache corruption degrades silently.
pub fn get_value<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str, fallback: T) -> T {
    match store.read(key) {
        Some(raw) => serde_json::from_str(&raw).unwrap_or(fallback),
        None => fallback,
    }
}

/// Encode and store a value. A value that fails to serialize is dropped
/// with a warning rather than surfaced; persistence here is best effort.
pub fn set_value<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) {
    match serde_json::to_string(value) {
        Ok(raw) => store.write(key, raw),
        Err(err) => warn!(key, error = %err, "dropping unserializable cache value"),
    }
}
