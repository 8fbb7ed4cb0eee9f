//! Client library for the Eloquent chat backend.
//!
//! Covers the request/response surface (conversations, history, delete,
//! summarize, auth) and the two streaming transports for live turns: a
//! conversation-scoped WebSocket and an SSE fallback. Backend responses
//! arrive in several historical shapes; the [`types`] module folds them
//! into one canonical model with explicit defaults.

pub mod config;
pub mod error;
pub mod http;
pub mod stream;
pub mod types;

pub use config::ApiConfig;
pub use error::{ClientError, ClientResult};
pub use http::ChatClient;
pub use stream::{
    SseTransport, StreamTransport, TurnEvent, TurnEventStream, TurnRequest, WebSocketTransport,
};
pub use types::{AuthUser, ChatTurn, ConversationSummary, Message, Role};
