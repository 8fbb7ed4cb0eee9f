use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single chat message as held by the client.
///
/// Ids are server-assigned for backend-sourced messages and locally
/// generated (`local-...`) for optimistic entries. `content` is mutated in
/// place while a response is streaming; `streaming` marks the placeholder
/// until the turn settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    /// Locally generated id for an optimistic entry.
    pub fn local_id() -> String {
        format!("local-{}", Uuid::new_v4())
    }

    /// Optimistic user message, stamped with the current time.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Self::local_id(),
            role: Role::User,
            content: content.into(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            streaming: false,
        }
    }

    /// Assistant message holding fixed text (error notices, etc).
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Self::local_id(),
            role: Role::Assistant,
            content: content.into(),
            created_at: None,
            streaming: false,
        }
    }
}

/// Compact record representing a conversation in a list view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Result of a completed chat turn: the conversation it landed in and the
/// backend's authoritative message list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatTurn {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

/// Identity returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub name: Option<String>,
    pub token: Option<String>,
}

/// Coerce an id that may arrive as a JSON string or number.
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_role(value: &Value) -> Role {
    match value.as_str() {
        Some("user") => Role::User,
        Some("system") => Role::System,
        _ => Role::Assistant,
    }
}

/// Map one backend message into the canonical shape.
///
/// Returns `None` for non-object input and for system-role entries, which
/// never reach the display list. Missing fields degrade to safe defaults:
/// a generated id, assistant role, empty content.
pub fn map_backend_message(raw: &Value) -> Option<Message> {
    let obj = raw.as_object()?;
    let role = obj
        .get("role")
        .map(value_to_role)
        .unwrap_or(Role::Assistant);
    if role == Role::System {
        return None;
    }
    Some(Message {
        id: obj
            .get("id")
            .and_then(value_to_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        role,
        content: obj
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: obj
            .get("created_at")
            .and_then(Value::as_str)
            .map(str::to_string),
        streaming: false,
    })
}

/// Pull a message array out of the shapes the backend uses
/// (`data.messages`, `messages`, or a bare array) and map each entry.
pub fn map_backend_messages(json: &Value) -> Vec<Message> {
    let raw = json
        .pointer("/data/messages")
        .or_else(|| json.get("messages"))
        .unwrap_or(json);
    raw.as_array()
        .map(|items| items.iter().filter_map(map_backend_message).collect())
        .unwrap_or_default()
}

/// Map the conversation-list response, tolerating the several shapes the
/// backend emits for the array and its items.
pub fn map_conversation_list(json: &Value) -> Vec<ConversationSummary> {
    let items = json
        .pointer("/data/conversations")
        .or_else(|| json.pointer("/data/items"))
        .or_else(|| json.get("items"))
        .or_else(|| json.get("data"))
        .and_then(Value::as_array);

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .map(|c| {
            let id = c
                .get("id")
                .or_else(|| c.get("conversation_id"))
                .and_then(value_to_id)
                .unwrap_or_default();
            let title = c
                .get("short_name")
                .or_else(|| c.get("title"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Conversation {}", id));
            ConversationSummary {
                id,
                title,
                last_message_preview: c
                    .get("description")
                    .or_else(|| c.get("preview"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                created_at: c
                    .get("created_at")
                    .or_else(|| c.get("updated_at"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }
        })
        .collect()
}

/// Map a turn response (`/create`, streaming `done` payloads) into a
/// [`ChatTurn`]. The payload may or may not be wrapped in a `data` object.
pub fn map_chat_turn(json: &Value) -> ChatTurn {
    let conversation_id = json
        .pointer("/data/conversation_id")
        .or_else(|| json.get("conversation_id"))
        .and_then(value_to_id)
        .unwrap_or_default();
    ChatTurn {
        conversation_id,
        messages: map_backend_messages(json),
    }
}

/// Extract the user identity from an auth response. `None` when no user id
/// can be found anywhere in the known shapes.
pub fn extract_auth_user(json: &Value) -> Option<AuthUser> {
    let user_id = json
        .pointer("/data/user/id")
        .or_else(|| json.pointer("/data/user_id"))
        .or_else(|| json.pointer("/user/id"))
        .or_else(|| json.get("user_id"))
        .and_then(value_to_id)?;
    let name = json
        .pointer("/data/user/name")
        .or_else(|| json.pointer("/user/name"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let token = json
        .pointer("/data/access_token")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(AuthUser {
        user_id,
        name,
        token,
    })
}

/// Extract a backend-supplied error message, falling back to a fixed text.
pub fn extract_error_message(json: Option<&Value>, fallback: &str) -> String {
    json.and_then(|v| {
        v.pointer("/data/message")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
    })
    .map(str::to_string)
    .unwrap_or_else(|| fallback.to_string())
}
