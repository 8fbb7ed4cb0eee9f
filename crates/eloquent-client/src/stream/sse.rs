use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::http::ChatClient;
use crate::types::map_chat_turn;

use super::{
    BoxFuture, StreamTransport, TurnEvent, TurnEventStream, TurnRequest, degraded_completion,
};

/// One parsed `event:`/`data:` block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseBlock {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental parser for a `text/event-stream` body.
///
/// Bytes go in as they arrive off the wire; completed blocks come out.
/// Lines are CR-tolerant (CRLF endings are stripped), comment lines are
/// skipped, and a blank line closes the current block. Pure state so it can
/// be unit tested without any I/O.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every block it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseBlock> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut blocks = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(block) = self.take_block() {
                    blocks.push(block);
                }
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
            // Comment lines (leading ':') and unknown fields are skipped.
        }
        blocks
    }

    /// Flush a trailing block that was never closed by a blank line.
    pub fn finish(&mut self) -> Option<SseBlock> {
        // Close any unterminated final line, then drain the pending block.
        if let Some(block) = self.push(b"\n").into_iter().next() {
            return Some(block);
        }
        self.take_block()
    }

    fn take_block(&mut self) -> Option<SseBlock> {
        let event = self.event.take();
        let data = std::mem::take(&mut self.data);
        if event.is_none() && data.is_empty() {
            return None;
        }
        Some(SseBlock {
            event,
            data: data.join("\n"),
        })
    }
}

/// Map a parsed block onto the turn event model.
///
/// Unset event name: a `delta` JSON field (or, failing JSON, the raw data
/// text) is an increment. `done` carries the final result; a malformed
/// `done` payload degrades to an empty completion rather than failing a
/// turn that already finished server-side. `error` carries a message.
pub(crate) fn block_to_event(block: &SseBlock, request: &TurnRequest) -> Option<TurnEvent> {
    match block.event.as_deref() {
        Some("done") => match serde_json::from_str::<Value>(&block.data) {
            Ok(value) => Some(TurnEvent::Done(map_chat_turn(&value))),
            Err(_) => Some(degraded_completion(request)),
        },
        Some("error") => {
            let message = serde_json::from_str::<Value>(&block.data)
                .ok()
                .as_ref()
                .and_then(|v| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| block.data.clone());
            Some(TurnEvent::Fail { message })
        }
        Some(_) => None,
        None => {
            let delta = serde_json::from_str::<Value>(&block.data)
                .ok()
                .as_ref()
                .and_then(|v| v.get("delta"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| block.data.clone());
            Some(TurnEvent::Delta(delta))
        }
    }
}

/// Fallback streaming transport: one POST answered with an event stream.
///
/// A backend that degrades to a plain JSON body is handled by decoding the
/// whole response as the final result. A stream that ends without any
/// terminal event resolves as a degraded empty completion, so the turn keeps
/// whatever content already streamed instead of failing.
pub struct SseTransport {
    client: Arc<ChatClient>,
}

impl SseTransport {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

impl StreamTransport for SseTransport {
    fn open(&self, request: TurnRequest) -> BoxFuture<'static, ClientResult<TurnEventStream>> {
        let client = Arc::clone(&self.client);

        Box::pin(async move {
            let url = format!("{}/stream", client.config().chat_base());
            let body = serde_json::json!({
                "conversation_id": request.conversation_id.clone(),
                "message": request.message.clone(),
                "user_id": request.user_id.clone(),
            });

            let mut http_request = client
                .http_client()
                .post(url)
                .header(ACCEPT, "text/event-stream")
                .json(&body);
            if let Some(token) = client.token() {
                http_request = http_request.bearer_auth(token);
            }

            let response = http_request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ClientError::Status {
                    message: "Chat request failed",
                    status,
                });
            }

            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("application/json"));

            if is_json {
                // Degraded non-streaming response: the body is the result.
                let value: Value = response.json().await?;
                debug!("stream endpoint answered with a single json body");
                let event = TurnEvent::Done(map_chat_turn(&value));
                let stream =
                    futures::stream::once(async move { Ok::<_, ClientError>(event) });
                return Ok(Box::pin(stream) as TurnEventStream);
            }

            let stream = async_stream::stream! {
                let mut parser = SseParser::new();
                let mut settled = false;
                let mut body = response.bytes_stream();

                'read: while let Some(chunk) = body.next().await {
                    match chunk {
                        Ok(bytes) => {
                            for block in parser.push(bytes.as_ref()) {
                                if let Some(event) = block_to_event(&block, &request) {
                                    let terminal = event.is_terminal();
                                    yield Ok(event);
                                    if terminal {
                                        settled = true;
                                        break 'read;
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            yield Err(ClientError::Http(err));
                            settled = true;
                            break;
                        }
                    }
                }

                if !settled {
                    if let Some(event) = parser.finish().and_then(|b| block_to_event(&b, &request)) {
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            settled = true;
                        }
                    }
                }
                if !settled {
                    yield Ok(degraded_completion(&request));
                }
            };

            Ok(Box::pin(stream) as TurnEventStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TurnRequest {
        TurnRequest {
            conversation_id: Some("7".to_string()),
            message: "hi".to_string(),
            user_id: None,
        }
    }

    #[test]
    fn parses_blocks_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"data: {\"de").is_empty());
        let blocks = parser.push(b"lta\": \"Hel\"}\n\ndata: x");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, "{\"delta\": \"Hel\"}");
        assert_eq!(blocks[0].event, None);

        let tail = parser.finish().expect("unterminated block flushes");
        assert_eq!(tail.data, "x");
    }

    #[test]
    fn crlf_line_endings_are_normalized() {
        let mut parser = SseParser::new();
        let blocks = parser.push(b"event: done\r\ndata: {\"conversation_id\": \"3\"}\r\n\r\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].event.as_deref(), Some("done"));
        assert_eq!(blocks[0].data, "{\"conversation_id\": \"3\"}");
    }

    #[test]
    fn unnamed_block_with_delta_field_is_an_increment() {
        let block = SseBlock {
            event: None,
            data: "{\"delta\": \"lo\"}".to_string(),
        };
        assert_eq!(
            block_to_event(&block, &request()),
            Some(TurnEvent::Delta("lo".to_string()))
        );
    }

    #[test]
    fn non_json_data_is_treated_as_plain_delta() {
        let block = SseBlock {
            event: None,
            data: "plain text".to_string(),
        };
        assert_eq!(
            block_to_event(&block, &request()),
            Some(TurnEvent::Delta("plain text".to_string()))
        );
    }

    #[test]
    fn done_block_resolves_with_conversation_and_messages() {
        let block = SseBlock {
            event: Some("done".to_string()),
            data: r#"{"conversation_id": "42", "messages": [{"role": "assistant", "content": "Hello"}]}"#
                .to_string(),
        };
        match block_to_event(&block, &request()) {
            Some(TurnEvent::Done(turn)) => {
                assert_eq!(turn.conversation_id, "42");
                assert_eq!(turn.messages.len(), 1);
            }
            other => panic!("expected done, got {:?}", other),
        }
    }

    #[test]
    fn malformed_done_payload_degrades_to_known_conversation() {
        let block = SseBlock {
            event: Some("done".to_string()),
            data: "not json".to_string(),
        };
        match block_to_event(&block, &request()) {
            Some(TurnEvent::Done(turn)) => {
                assert_eq!(turn.conversation_id, "7");
                assert!(turn.messages.is_empty());
            }
            other => panic!("expected degraded done, got {:?}", other),
        }
    }

    #[test]
    fn error_block_carries_message() {
        let block = SseBlock {
            event: Some("error".to_string()),
            data: r#"{"message": "backend unavailable"}"#.to_string(),
        };
        assert_eq!(
            block_to_event(&block, &request()),
            Some(TurnEvent::Fail {
                message: "backend unavailable".to_string()
            })
        );
    }

    #[test]
    fn unknown_event_names_are_ignored() {
        let block = SseBlock {
            event: Some("ping".to_string()),
            data: "{}".to_string(),
        };
        assert_eq!(block_to_event(&block, &request()), None);
    }
}
