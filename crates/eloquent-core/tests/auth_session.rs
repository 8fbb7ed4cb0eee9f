use std::sync::Arc;

use eloquent_client::{ApiConfig, ChatClient, ConversationSummary};
use eloquent_core::auth::AuthSession;
use eloquent_core::storage::{KeyValueStore, MemoryStore, get_value, keys, set_value};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

async fn mock_login_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"id": "u-1", "name": "Ada"}, "access_token": "tok-1"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_persists_identity_and_refreshes_summaries() {
    let server = MockServer::start().await;
    mock_login_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations"))
        .and(query_param("user_id", "u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "c-1", "title": "First"}]
        })))
        .mount(&server)
        .await;

    let store = store();
    let client = Arc::new(ChatClient::new(ApiConfig::new(server.uri())));
    let mut auth = AuthSession::restore(Arc::clone(&client), Arc::clone(&store));
    auth.login_as_guest();

    let user_id = auth.login("a@b.c", "pw").await.unwrap();
    assert_eq!(user_id, "u-1");
    assert_eq!(auth.user_id(), Some("u-1"));
    assert_eq!(auth.display_name(), Some("Ada"));
    assert!(!auth.is_guest());
    assert_eq!(client.token().as_deref(), Some("tok-1"));

    let stored_user: Option<String> = get_value(store.as_ref(), keys::USER_ID, None);
    assert_eq!(stored_user.as_deref(), Some("u-1"));
    assert!(!get_value(store.as_ref(), keys::GUEST_MODE, true));

    let summaries: Vec<ConversationSummary> =
        get_value(store.as_ref(), keys::CONVERSATION_SUMMARIES, Vec::new());
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, "c-1");
}

#[tokio::test]
async fn failing_list_fetch_after_login_is_non_fatal() {
    let server = MockServer::start().await;
    mock_login_ok(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store();
    let client = Arc::new(ChatClient::new(ApiConfig::new(server.uri())));
    let mut auth = AuthSession::restore(client, Arc::clone(&store));

    // Login still succeeds; summaries simply reset to empty.
    auth.login("a@b.c", "pw").await.unwrap();
    let summaries: Vec<ConversationSummary> =
        get_value(store.as_ref(), keys::CONVERSATION_SUMMARIES, Vec::new());
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn rejected_login_leaves_state_untouched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "nope"})))
        .mount(&server)
        .await;

    let store = store();
    let client = Arc::new(ChatClient::new(ApiConfig::new(server.uri())));
    let mut auth = AuthSession::restore(client, Arc::clone(&store));

    let err = auth.login("a@b.c", "bad").await.unwrap_err();
    assert_eq!(err.to_string(), "nope");
    assert_eq!(auth.user_id(), None);
    let stored_user: Option<String> = get_value(store.as_ref(), keys::USER_ID, None);
    assert_eq!(stored_user, None);
}

#[tokio::test]
async fn signup_falls_back_to_submitted_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user_id": "u-2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chat/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let store = store();
    let client = Arc::new(ChatClient::new(ApiConfig::new(server.uri())));
    let mut auth = AuthSession::restore(client, Arc::clone(&store));

    auth.signup("Grace", "g@h.i", "pw").await.unwrap();
    assert_eq!(auth.display_name(), Some("Grace"));
}

#[tokio::test]
async fn guest_login_and_logout_reset_the_cache() {
    let store = store();
    set_value(store.as_ref(), keys::USER_ID, &Some("u-1".to_string()));
    set_value(
        store.as_ref(),
        keys::CURRENT_CONVERSATION_ID,
        &Some("c-9".to_string()),
    );
    set_value(
        store.as_ref(),
        keys::CONVERSATION_SUMMARIES,
        &vec![ConversationSummary {
            id: "c-9".to_string(),
            title: "t".to_string(),
            last_message_preview: None,
            created_at: None,
        }],
    );

    set_value(store.as_ref(), keys::AUTH_TOKEN, &Some("tok".to_string()));

    let client = Arc::new(ChatClient::new(ApiConfig::new("http://127.0.0.1:1")));
    let mut auth = AuthSession::restore(Arc::clone(&client), Arc::clone(&store));
    assert_eq!(client.token().as_deref(), Some("tok"));

    auth.login_as_guest();
    assert!(auth.is_guest());
    assert_eq!(auth.user_id(), None);
    assert_eq!(client.token(), None);
    assert!(get_value(store.as_ref(), keys::GUEST_MODE, false));
    let pointer: Option<String> = get_value(store.as_ref(), keys::CURRENT_CONVERSATION_ID, None);
    assert_eq!(pointer, None);
    let summaries: Vec<ConversationSummary> =
        get_value(store.as_ref(), keys::CONVERSATION_SUMMARIES, Vec::new());
    assert!(summaries.is_empty());

    auth.logout();
    assert!(!auth.is_guest());
    assert!(!get_value(store.as_ref(), keys::GUEST_MODE, true));
}

#[tokio::test]
async fn restore_installs_the_cached_token() {
    let store = store();
    set_value(store.as_ref(), keys::AUTH_TOKEN, &Some("tok-7".to_string()));
    set_value(store.as_ref(), keys::USER_ID, &Some("u-7".to_string()));

    let client = Arc::new(ChatClient::new(ApiConfig::new("http://127.0.0.1:1")));
    let auth = AuthSession::restore(Arc::clone(&client), store);

    assert_eq!(auth.user_id(), Some("u-7"));
    assert_eq!(client.token().as_deref(), Some("tok-7"));
}
