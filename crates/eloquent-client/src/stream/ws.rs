use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::http::ChatClient;

use super::{BoxFuture, StreamTransport, TurnEventStream, TurnRequest, decode_stream_frame};

/// Primary streaming transport: a conversation-scoped WebSocket.
///
/// The outgoing message is sent as a single JSON frame once the socket is
/// open; inbound frames are either raw text deltas or JSON event frames.
/// A socket that closes before a terminal event fails the attempt with
/// [`ClientError::ChannelClosed`] so the caller can fall back.
pub struct WebSocketTransport {
    client: Arc<ChatClient>,
}

impl WebSocketTransport {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self { client }
    }
}

impl StreamTransport for WebSocketTransport {
    fn open(&self, request: TurnRequest) -> BoxFuture<'static, ClientResult<TurnEventStream>> {
        let url = self.client.config().ws_url(
            request.conversation_id.as_deref(),
            self.client.token().as_deref(),
        );

        Box::pin(async move {
            let (socket, _) = connect_async(url.as_str()).await?;
            let (mut tx, mut rx) = socket.split();

            let frame = serde_json::json!({ "message": request.message }).to_string();
            tx.send(WsMessage::Text(frame)).await?;
            debug!(url = %url, "websocket turn opened");

            let stream = async_stream::stream! {
                let mut settled = false;
                while let Some(frame) = rx.next().await {
                    match frame {
                        Ok(WsMessage::Text(text)) => {
                            let event = decode_stream_frame(&text);
                            let terminal = event.is_terminal();
                            yield Ok(event);
                            if terminal {
                                settled = true;
                                break;
                            }
                        }
                        Ok(WsMessage::Ping(payload)) => {
                            let _ = tx.send(WsMessage::Pong(payload)).await;
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(err) => {
                            yield Err(ClientError::WebSocket(err));
                            settled = true;
                            break;
                        }
                    }
                }
                if !settled {
                    yield Err(ClientError::ChannelClosed);
                }
            };

            Ok(Box::pin(stream) as TurnEventStream)
        })
    }
}
