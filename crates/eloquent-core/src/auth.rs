use std::sync::Arc;

use eloquent_client::{ChatClient, ClientResult, ConversationSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, get_value, keys, set_value};

/// Display profile persisted alongside the user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authenticated / guest / anonymous session state.
///
/// Guest and authenticated states are mutually exclusive: becoming either
/// one performs a full cache reset (token, profile, summaries, current
/// conversation). Login and signup additionally refresh the summary cache
/// best-effort; a failed list fetch is non-fatal and leaves it empty.
pub struct AuthSession {
    client: Arc<ChatClient>,
    store: Arc<dyn KeyValueStore>,
    user_id: Option<String>,
    guest: bool,
    profile: UserProfile,
}

impl AuthSession {
    /// Restore session state from the local cache. The cached token (if
    /// any) is installed on the client for subsequent requests.
    pub fn restore(client: Arc<ChatClient>, store: Arc<dyn KeyValueStore>) -> Self {
        let user_id: Option<String> = get_value(store.as_ref(), keys::USER_ID, None);
        let guest = get_value(store.as_ref(), keys::GUEST_MODE, false);
        let profile = get_value(store.as_ref(), keys::USER_PROFILE, UserProfile::default());
        let token: Option<String> = get_value(store.as_ref(), keys::AUTH_TOKEN, None);
        client.set_token(token);
        Self {
            client,
            store,
            user_id,
            guest,
            profile,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_guest(&self) -> bool {
        self.guest
    }

    pub fn display_name(&self) -> Option<&str> {
        self.profile.name.as_deref()
    }

    /// Authenticate and adopt the returned identity. Nothing is mutated
    /// when the backend rejects the attempt.
    pub async fn login(&mut self, email: &str, password: &str) -> ClientResult<String> {
        let user = self.client.login(email, password).await?;
        self.adopt_identity(user.user_id.clone(), user.name, user.token)
            .await;
        Ok(user.user_id)
    }

    /// Register and adopt the returned identity; the submitted name is the
    /// fallback when the backend does not echo one back.
    pub async fn signup(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<String> {
        let user = self.client.signup(name, email, password).await?;
        let display_name = user.name.or_else(|| Some(name.to_string()));
        self.adopt_identity(user.user_id.clone(), display_name, user.token)
            .await;
        Ok(user.user_id)
    }

    /// Enter guest mode: no backend identity, cache fully reset.
    pub fn login_as_guest(&mut self) {
        self.reset_cache();
        self.guest = true;
        set_value(self.store.as_ref(), keys::GUEST_MODE, &true);
        debug!("entered guest mode");
    }

    /// Back to fully anonymous state.
    pub fn logout(&mut self) {
        self.reset_cache();
        self.guest = false;
        set_value(self.store.as_ref(), keys::GUEST_MODE, &false);
        debug!("logged out");
    }

    async fn adopt_identity(
        &mut self,
        user_id: String,
        name: Option<String>,
        token: Option<String>,
    ) {
        self.user_id = Some(user_id.clone());
        self.guest = false;
        self.profile = UserProfile { name };
        self.client.set_token(token.clone());

        set_value(self.store.as_ref(), keys::USER_ID, &self.user_id);
        set_value(self.store.as_ref(), keys::USER_PROFILE, &self.profile);
        set_value(self.store.as_ref(), keys::GUEST_MODE, &false);
        set_value(self.store.as_ref(), keys::AUTH_TOKEN, &token);

        // Best effort: a failing list fetch only leaves the cache empty.
        let summaries = match self.client.list_conversations(Some(&user_id)).await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "could not load conversation list after sign-in");
                Vec::new()
            }
        };
        set_value::<Vec<ConversationSummary>>(
            self.store.as_ref(),
            keys::CONVERSATION_SUMMARIES,
            &summaries,
        );
    }

    fn reset_cache(&mut self) {
        self.user_id = None;
        self.profile = UserProfile::default();
        self.client.set_token(None);

        set_value::<Option<String>>(self.store.as_ref(), keys::USER_ID, &None);
        set_value(self.store.as_ref(), keys::USER_PROFILE, &UserProfile::default());
        set_value::<Option<String>>(self.store.as_ref(), keys::AUTH_TOKEN, &None);
        set_value::<Vec<ConversationSummary>>(
            self.store.as_ref(),
            keys::CONVERSATION_SUMMARIES,
            &Vec::new(),
        );
        set_value::<Option<String>>(self.store.as_ref(), keys::CURRENT_CONVERSATION_ID, &None);
    }
}
