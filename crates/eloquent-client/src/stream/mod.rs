//! Streaming turn transports.
//!
//! A turn is delivered live over one of two transports: a bidirectional
//! WebSocket (primary) or a unidirectional SSE response (fallback). Both
//! reduce to the same event stream so the orchestrator upstream does not
//! care which one produced the result.

use std::future::Future;
use std::pin::Pin;

use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::ClientResult;
use crate::types::{ChatTurn, extract_error_message, map_chat_turn};

mod sse;
mod ws;

pub use sse::SseTransport;
pub use ws::WebSocketTransport;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One streaming turn request.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: Option<String>,
    pub message: String,
    pub user_id: Option<String>,
}

/// Events produced by a streaming transport.
///
/// `Done` and `Fail` are terminal: nothing follows them. A transport that
/// ends without either yields `Err(ClientError::ChannelClosed)` instead so
/// the caller can tell a dead channel from a finished turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Incremental fragment of the assistant response.
    Delta(String),
    /// Terminal: the turn completed with an authoritative result.
    Done(ChatTurn),
    /// Terminal: the backend reported an explicit error for this turn.
    Fail { message: String },
}

impl TurnEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnEvent::Done(_) | TurnEvent::Fail { .. })
    }
}

/// Stream of turn events; item-level errors are transport failures.
pub type TurnEventStream = BoxStream<'static, ClientResult<TurnEvent>>;

/// A live response channel for one turn.
///
/// `open` establishes the channel and sends the outgoing message; the
/// returned stream yields deltas until a terminal event. Object-safe so the
/// orchestrator can be exercised with scripted fakes.
pub trait StreamTransport: Send + Sync {
    fn open(&self, request: TurnRequest) -> BoxFuture<'static, ClientResult<TurnEventStream>>;
}

/// Classify a decoded JSON frame/payload into a turn event.
///
/// `done` and `guardrails` both deliver the final result; `error` carries a
/// backend message; anything else with a `delta` string is an increment.
/// Returns `None` when the value matches no known shape.
pub(crate) fn classify_event_value(value: &Value) -> Option<TurnEvent> {
    match value.get("event").and_then(Value::as_str) {
        Some("done") | Some("guardrails") => Some(TurnEvent::Done(map_chat_turn(value))),
        Some("error") => Some(TurnEvent::Fail {
            message: extract_error_message(Some(value), "Chat stream failed"),
        }),
        Some(_) => None,
        None => value
            .get("delta")
            .and_then(Value::as_str)
            .map(|delta| TurnEvent::Delta(delta.to_string())),
    }
}

/// Decode a raw WebSocket text frame: structured events where possible,
/// otherwise the whole payload is a plain text delta.
pub(crate) fn decode_stream_frame(text: &str) -> TurnEvent {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            classify_event_value(&value).unwrap_or_else(|| TurnEvent::Delta(text.to_string()))
        }
        Err(_) => TurnEvent::Delta(text.to_string()),
    }
}

/// Degraded completion used when a stream ends cleanly without a terminal
/// event: keep whatever streamed, resolve with the already-known id.
pub(crate) fn degraded_completion(request: &TurnRequest) -> TurnEvent {
    TurnEvent::Done(ChatTurn {
        conversation_id: request.conversation_id.clone().unwrap_or_default(),
        messages: Vec::new(),
    })
}
