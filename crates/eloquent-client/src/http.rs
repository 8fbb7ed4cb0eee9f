use parking_lot::RwLock;
use reqwest::RequestBuilder;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::ApiConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::{
    AuthUser, ChatTurn, ConversationSummary, Message, extract_auth_user, extract_error_message,
    map_backend_messages, map_chat_turn, map_conversation_list,
};

/// Request/response client for the chat and auth endpoints.
///
/// Hold it behind an `Arc` and share.
/// The bearer token is interior-mutable so a login performed through one
/// handle is visible to every other caller.
pub struct ChatClient {
    http: reqwest::Client,
    config: ApiConfig,
    token: RwLock<Option<String>>,
}

impl ChatClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Clone of the underlying HTTP client (internally reference-counted),
    /// for transports that issue their own requests.
    pub fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    /// Replace the cached bearer token (`None` clears it).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Decode a response body as JSON, mapping non-success statuses to the
    /// fixed per-operation message first.
    async fn read_json(
        response: reqwest::Response,
        operation: &'static str,
    ) -> ClientResult<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                message: operation,
                status,
            });
        }
        Ok(response.json().await?)
    }

    /// `GET /conversations?user_id=`: summaries for a user's conversations.
    pub async fn list_conversations(
        &self,
        user_id: Option<&str>,
    ) -> ClientResult<Vec<ConversationSummary>> {
        let mut request = self
            .authorize(self.http.get(format!("{}/conversations", self.config.chat_base())));
        if let Some(user_id) = user_id {
            request = request.query(&[("user_id", user_id)]);
        }
        let json = Self::read_json(request.send().await?, "Failed to fetch conversations").await?;
        let list = map_conversation_list(&json);
        debug!(count = list.len(), "fetched conversation list");
        Ok(list)
    }

    /// `GET /messages/{id}`: full history for one conversation.
    pub async fn conversation_messages(
        &self,
        conversation_id: &str,
    ) -> ClientResult<Vec<Message>> {
        let url = format!("{}/messages/{}", self.config.chat_base(), conversation_id);
        let json = Self::read_json(
            self.authorize(self.http.get(url)).send().await?,
            "Failed to fetch conversation messages",
        )
        .await?;
        Ok(map_backend_messages(&json))
    }

    /// `POST /create`: create or continue a conversation with one message,
    /// returning the conversation id and the authoritative message list.
    pub async fn post_chat_once(
        &self,
        conversation_id: Option<&str>,
        message: &str,
        user_id: Option<&str>,
    ) -> ClientResult<ChatTurn> {
        let body = json!({
            "conversation_id": conversation_id,
            "message": message,
            "user_id": user_id,
        });
        let url = format!("{}/create", self.config.chat_base());
        let json = Self::read_json(
            self.authorize(self.http.post(url)).json(&body).send().await?,
            "Chat request failed",
        )
        .await?;
        Ok(map_chat_turn(&json))
    }

    /// `POST /delete/{id}`: success/failure only.
    pub async fn delete_conversation(&self, conversation_id: &str) -> ClientResult<()> {
        let url = format!("{}/delete/{}", self.config.chat_base(), conversation_id);
        let response = self.authorize(self.http.post(url)).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::Status {
                message: "Failed to delete conversation",
                status: response.status(),
            });
        }
        Ok(())
    }

    /// `POST /summarize/{id}`: backend-generated plain-text summary.
    pub async fn summarize_conversation(&self, conversation_id: &str) -> ClientResult<String> {
        let url = format!("{}/summarize/{}", self.config.chat_base(), conversation_id);
        let json = Self::read_json(
            self.authorize(self.http.post(url)).send().await?,
            "Failed to summarize conversation",
        )
        .await?;
        Ok(json
            .pointer("/data/summary")
            .or_else(|| json.get("summary"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Shared shape of `/login` and `/signup`: surface the backend's message
    /// on rejection, require a user id on success.
    async fn auth_request(
        &self,
        url: String,
        body: Value,
        fallback: &'static str,
        invalid: &'static str,
    ) -> ClientResult<AuthUser> {
        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        let json: Option<Value> = response.json().await.ok();
        if !status.is_success() {
            return Err(ClientError::Api {
                message: extract_error_message(json.as_ref(), fallback),
            });
        }
        json.as_ref()
            .and_then(extract_auth_user)
            .ok_or(ClientError::InvalidResponse { message: invalid })
    }

    /// `POST /login`.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<AuthUser> {
        self.auth_request(
            format!("{}/login", self.config.auth_base()),
            json!({"email": email, "password": password}),
            "Login failed",
            "Invalid login response",
        )
        .await
    }

    /// `POST /signup`.
    pub async fn signup(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<AuthUser> {
        self.auth_request(
            format!("{}/signup", self.config.auth_base()),
            json!({"name": name, "email": email, "password": password}),
            "Signup failed",
            "Invalid signup response",
        )
        .await
    }

    /// `GET /me`: session probe for the currently cached token.
    pub async fn me(&self) -> ClientResult<AuthUser> {
        let url = format!("{}/me", self.config.auth_base());
        let response = self.authorize(self.http.get(url)).send().await?;
        let status = response.status();
        let json: Option<Value> = response.json().await.ok();
        if !status.is_success() {
            return Err(ClientError::Api {
                message: extract_error_message(json.as_ref(), "Session check failed"),
            });
        }
        json.as_ref()
            .and_then(extract_auth_user)
            .ok_or(ClientError::InvalidResponse {
                message: "Invalid session response",
            })
    }
}
