use std::env;

/// Default backend base URL, used when `ELOQUENT_API_BASE` is not set.
const DEFAULT_API_BASE: &str = "http://18.223.20.255:5000";

/// Environment variable that overrides the backend base URL.
const API_BASE_ENV: &str = "ELOQUENT_API_BASE";

/// Backend endpoint configuration.
///
/// Holds the single base URL the backend is reached at; the chat, auth and
/// WebSocket endpoints are derived from it.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    base_url: String,
}

impl ApiConfig {
    /// Create a config for an explicit base URL (trailing slashes stripped).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Read the base URL from `ELOQUENT_API_BASE`, falling back to the
    /// built-in default.
    pub fn from_env() -> Self {
        let base = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(base)
    }

    /// The raw base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base path for chat endpoints.
    pub fn chat_base(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Base path for auth endpoints.
    pub fn auth_base(&self) -> String {
        format!("{}/api/auth", self.base_url)
    }

    /// WebSocket URL for a conversation-scoped streaming turn.
    ///
    /// New conversations (no id yet) address the sentinel id `0`. The scheme
    /// is mapped http→ws / https→wss; a cached auth token rides along as a
    /// query parameter because WebSocket handshakes cannot carry headers from
    /// every client environment.
    pub fn ws_url(&self, conversation_id: Option<&str>, token: Option<&str>) -> String {
        let ws_base = if self.base_url.starts_with("https") {
            self.base_url.replacen("https", "wss", 1)
        } else {
            self.base_url.replacen("http", "ws", 1)
        };
        let id = conversation_id.filter(|id| !id.is_empty()).unwrap_or("0");
        let mut url = format!("{}/api/chat/ws/{}", ws_base, id);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.push_str("?token=");
            url.push_str(token);
        }
        url
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
