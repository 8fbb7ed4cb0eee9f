use std::sync::Arc;

use eloquent_client::{
    ApiConfig, ChatClient, ClientError, StreamTransport, TurnEvent, TurnRequest, WebSocketTransport,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Accept one WebSocket connection, wait for the client's message frame,
/// then play back `frames` and close. Returns the HTTP base URL.
async fn spawn_server(frames: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        // First inbound frame is the outgoing turn message.
        let first = socket.next().await.unwrap().unwrap();
        let text = first.into_text().unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("message").is_some());

        for frame in frames {
            socket.send(WsMessage::Text(frame)).await.unwrap();
        }
        let _ = socket.close(None).await;
    });

    format!("http://{}", addr)
}

fn transport_for(base: &str) -> WebSocketTransport {
    WebSocketTransport::new(Arc::new(ChatClient::new(ApiConfig::new(base))))
}

fn request() -> TurnRequest {
    TurnRequest {
        conversation_id: None,
        message: "hello".to_string(),
        user_id: Some("u-1".to_string()),
    }
}

#[tokio::test]
async fn raw_deltas_then_done_frame_resolve_the_turn() {
    let done = json!({
        "event": "done",
        "conversation_id": "42",
        "messages": [
            {"id": 1, "role": "user", "content": "hello"},
            {"id": 2, "role": "assistant", "content": "Hello"},
        ]
    })
    .to_string();
    let base = spawn_server(vec!["Hel".to_string(), "lo".to_string(), done]).await;

    let mut stream = transport_for(&base).open(request()).await.unwrap();
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event.unwrap());
    }

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], TurnEvent::Delta("Hel".to_string()));
    assert_eq!(events[1], TurnEvent::Delta("lo".to_string()));
    match &events[2] {
        TurnEvent::Done(turn) => {
            assert_eq!(turn.conversation_id, "42");
            assert_eq!(turn.messages.len(), 2);
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn error_frame_fails_the_turn_with_backend_message() {
    let error = json!({"event": "error", "message": "guard tripped"}).to_string();
    let base = spawn_server(vec![error]).await;

    let mut stream = transport_for(&base).open(request()).await.unwrap();
    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(
        event,
        TurnEvent::Fail {
            message: "guard tripped".to_string()
        }
    );
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn close_before_terminal_event_is_a_channel_failure() {
    let base = spawn_server(vec!["partial".to_string()]).await;

    let mut stream = transport_for(&base).open(request()).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first, TurnEvent::Delta("partial".to_string()));

    let last = stream.next().await.unwrap();
    assert!(matches!(last, Err(ClientError::ChannelClosed)));
}

#[tokio::test]
async fn unreachable_server_fails_to_open() {
    // Bind then drop to find a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = transport_for(&format!("http://{}", addr)).open(request()).await;
    assert!(result.is_err());
}
