use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the backend client.
///
/// The variants follow the failure classes the rest of the stack cares
/// about: connectivity failures (`Http`, `WebSocket`, `ChannelClosed`),
/// non-success statuses with a fixed per-operation message (`Status`),
/// explicit backend-supplied errors (`Api`), and decode failures that were
/// critical enough not to degrade to a default (`Json`, `InvalidResponse`).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message}")]
    Status {
        message: &'static str,
        status: StatusCode,
    },

    #[error("{message}")]
    Api { message: String },

    #[error("{message}")]
    InvalidResponse { message: &'static str },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The streaming channel ended before a terminal event arrived. Kept
    /// distinct from `Api` so callers can tell a dead transport from an
    /// explicit backend error event.
    #[error("stream closed before completion")]
    ChannelClosed,

    #[error("decode failure: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
