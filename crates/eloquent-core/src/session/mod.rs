//! Streaming turn orchestration.
//!
//! One [`ChatSession`] drives the whole client-side chat lifecycle: the
//! transient message list, the persisted conversation pointer and summary
//! cache, and the per-turn state machine that prefers the WebSocket
//! transport and falls back to SSE.

mod events;

pub use events::{SessionEvent, TurnStatus};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use eloquent_client::{
    ChatClient, ChatTurn, ConversationSummary, Message, Role, SseTransport, StreamTransport,
    TurnEvent, TurnRequest, WebSocketTransport,
};

use crate::storage::{KeyValueStore, get_value, keys, set_value};
use crate::summary::{build_conversation_summary, upsert_summary};

/// Sentinel content of the streaming placeholder, cleared on first delta.
const PLACEHOLDER: &str = "…";

/// Fixed in-thread text when a turn fails with no backend message.
const TURN_FAILED_TEXT: &str = "Sorry, something went wrong while getting the response.";

const EVENT_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Only one turn may be outstanding; the caller should disable input
    /// while a turn runs instead of queueing.
    #[error("a turn is already in flight")]
    TurnInFlight,
}

/// How a completed `send_message` call settled.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed { conversation_id: Option<String> },
    Failed,
    Cancelled,
}

/// Result of one transport attempt.
enum Attempt {
    /// Terminal `done`/`guardrails` (or degraded SSE completion).
    Completed(ChatTurn),
    /// Explicit backend `error` event. Terminal, no fallback.
    Rejected(String),
    /// The channel died before any terminal event.
    Lost,
}

pub struct ChatSession {
    client: Arc<ChatClient>,
    store: Arc<dyn KeyValueStore>,
    primary: Box<dyn StreamTransport>,
    fallback: Box<dyn StreamTransport>,
    messages: Vec<Message>,
    turn_active: bool,
    turn_deadline: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    /// Session with the default transports: WebSocket first, SSE fallback.
    pub fn new(client: Arc<ChatClient>, store: Arc<dyn KeyValueStore>) -> Self {
        let primary = Box::new(WebSocketTransport::new(Arc::clone(&client)));
        let fallback = Box::new(SseTransport::new(Arc::clone(&client)));
        Self::with_transports(client, store, primary, fallback)
    }

    /// Session with explicit transports (tests inject scripted fakes here).
    pub fn with_transports(
        client: Arc<ChatClient>,
        store: Arc<dyn KeyValueStore>,
        primary: Box<dyn StreamTransport>,
        fallback: Box<dyn StreamTransport>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            store,
            primary,
            fallback,
            messages: Vec::new(),
            turn_active: false,
            turn_deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Cap the wall-clock time of each transport attempt. Off by default:
    /// the backend is expected to terminate its own streams.
    pub fn set_turn_deadline(&mut self, deadline: Option<Duration>) {
        self.turn_deadline = deadline;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Flag checked after suspension points; set it when the owner goes
    /// away so in-flight work stops committing state.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn current_conversation_id(&self) -> Option<String> {
        get_value(self.store.as_ref(), keys::CURRENT_CONVERSATION_ID, None)
    }

    pub fn summaries(&self) -> Vec<ConversationSummary> {
        get_value(self.store.as_ref(), keys::CONVERSATION_SUMMARIES, Vec::new())
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Execute one chat turn with live delivery.
    ///
    /// Known double-processing window: if the WebSocket opens and carries
    /// the message but dies before any frame, the SSE fallback re-sends it
    /// and the backend may process the message twice; the wire contract
    /// has no idempotency key to dedupe on.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        if self.turn_active {
            return Err(SessionError::TurnInFlight);
        }
        self.turn_active = true;
        let outcome = self.run_turn(text).await;
        self.turn_active = false;
        Ok(outcome)
    }

    async fn run_turn(&mut self, text: &str) -> TurnOutcome {
        let prior_conversation_id = self.current_conversation_id();
        let user_id: Option<String> = get_value(self.store.as_ref(), keys::USER_ID, None);

        self.messages.push(Message::user(text));
        let placeholder_id = Message::local_id();
        self.messages.push(Message {
            id: placeholder_id.clone(),
            role: Role::Assistant,
            content: PLACEHOLDER.to_string(),
            created_at: None,
            streaming: true,
        });
        self.emit(SessionEvent::MessagesChanged);
        self.emit(SessionEvent::TurnStarted);

        let request = TurnRequest {
            conversation_id: prior_conversation_id.clone(),
            message: text.to_string(),
            user_id,
        };

        let mut attempt = self.attempt(true, &request, &placeholder_id).await;
        if matches!(attempt, Attempt::Lost) && !self.is_cancelled() {
            debug!("primary transport lost, falling back to event stream");
            attempt = self.attempt(false, &request, &placeholder_id).await;
        }

        if self.is_cancelled() {
            debug!("turn cancelled, leaving state uncommitted");
            self.emit(SessionEvent::TurnEnded {
                status: TurnStatus::Cancelled,
            });
            return TurnOutcome::Cancelled;
        }

        match attempt {
            Attempt::Completed(turn) => {
                let conversation_id =
                    self.finalize_turn(prior_conversation_id.as_deref(), turn, &placeholder_id);
                self.emit(SessionEvent::TurnEnded {
                    status: TurnStatus::Completed,
                });
                TurnOutcome::Completed { conversation_id }
            }
            Attempt::Rejected(message) => {
                self.fail_turn(&placeholder_id, message);
                TurnOutcome::Failed
            }
            Attempt::Lost => {
                self.fail_turn(&placeholder_id, TURN_FAILED_TEXT.to_string());
                TurnOutcome::Failed
            }
        }
    }

    /// Open one transport and consume its events until a terminal one.
    /// Deltas mutate the placeholder in place as they arrive. The delta
    /// accumulator restarts per attempt: a fallback re-streams the
    /// response from the beginning.
    async fn attempt(
        &mut self,
        primary: bool,
        request: &TurnRequest,
        placeholder_id: &str,
    ) -> Attempt {
        let deadline = self
            .turn_deadline
            .map(|limit| tokio::time::Instant::now() + limit);

        let open = if primary {
            self.primary.open(request.clone())
        } else {
            self.fallback.open(request.clone())
        };

        let opened = match Self::bounded(deadline, open).await {
            Some(result) => result,
            None => {
                warn!(primary, "transport open timed out");
                return Attempt::Lost;
            }
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                warn!(primary, error = %err, "transport failed to open");
                return Attempt::Lost;
            }
        };

        let mut accumulator = String::new();
        loop {
            let item = match Self::bounded(deadline, stream.next()).await {
                Some(item) => item,
                None => {
                    warn!(primary, "turn attempt timed out mid-stream");
                    return Attempt::Lost;
                }
            };
            match item {
                Some(Ok(TurnEvent::Delta(delta))) => {
                    accumulator.push_str(&delta);
                    if let Some(placeholder) =
                        self.messages.iter_mut().find(|m| m.id == placeholder_id)
                    {
                        placeholder.content = accumulator.clone();
                    }
                    self.emit(SessionEvent::TextDelta { content: delta });
                }
                Some(Ok(TurnEvent::Done(turn))) => return Attempt::Completed(turn),
                Some(Ok(TurnEvent::Fail { message })) => return Attempt::Rejected(message),
                Some(Err(err)) => {
                    warn!(primary, error = %err, "stream failed before completion");
                    return Attempt::Lost;
                }
                None => {
                    // Transports yield a terminal event or an error before
                    // ending; a silent end still counts as a dead channel.
                    return Attempt::Lost;
                }
            }
        }
    }

    async fn bounded<F: std::future::Future>(
        deadline: Option<tokio::time::Instant>,
        future: F,
    ) -> Option<F::Output> {
        match deadline {
            Some(at) => tokio::time::timeout_at(at, future).await.ok(),
            None => Some(future.await),
        }
    }

    /// Commit a completed turn: adopt the authoritative list, persist a
    /// newly assigned conversation id, upsert the summary cache.
    fn finalize_turn(
        &mut self,
        prior_conversation_id: Option<&str>,
        turn: ChatTurn,
        placeholder_id: &str,
    ) -> Option<String> {
        if turn.messages.is_empty() {
            // Degraded completion: keep the streamed content, stop the spinner.
            if let Some(placeholder) = self.messages.iter_mut().find(|m| m.id == placeholder_id) {
                placeholder.streaming = false;
            }
        } else {
            // The backend list is authoritative and includes our optimistic
            // entries; replace wholesale.
            self.messages = turn.messages;
        }
        self.emit(SessionEvent::MessagesChanged);

        let resolved_id = if turn.conversation_id.is_empty() {
            prior_conversation_id.map(str::to_string)
        } else {
            Some(turn.conversation_id)
        };

        if let Some(id) = &resolved_id {
            if prior_conversation_id.is_none() {
                set_value(
                    self.store.as_ref(),
                    keys::CURRENT_CONVERSATION_ID,
                    &Some(id.clone()),
                );
            }
            let mut summaries = self.summaries();
            upsert_summary(&mut summaries, build_conversation_summary(&self.messages, id));
            set_value(self.store.as_ref(), keys::CONVERSATION_SUMMARIES, &summaries);
            self.emit(SessionEvent::SummariesChanged);
        }
        resolved_id
    }

    /// Surface a failed turn as an in-thread assistant message so the user
    /// is never left without feedback.
    fn fail_turn(&mut self, placeholder_id: &str, message: String) {
        if let Some(placeholder) = self.messages.iter_mut().find(|m| m.id == placeholder_id) {
            placeholder.streaming = false;
        }
        self.messages.push(Message::assistant(message.clone()));
        self.emit(SessionEvent::MessagesChanged);
        self.emit(SessionEvent::TurnEnded {
            status: TurnStatus::Failed(message),
        });
    }

    /// Reload whichever view is active: history when a conversation is
    /// selected, the conversation list otherwise. Failures degrade with a
    /// warning; cached state stays usable.
    pub async fn refresh(&mut self) {
        if let Some(conversation_id) = self.current_conversation_id() {
            match self.client.conversation_messages(&conversation_id).await {
                Ok(history) if !self.is_cancelled() => {
                    self.messages = history;
                    self.emit(SessionEvent::MessagesChanged);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "could not load messages"),
            }
        } else if let Some(user_id) =
            get_value::<Option<String>>(self.store.as_ref(), keys::USER_ID, None)
        {
            match self.client.list_conversations(Some(&user_id)).await {
                Ok(items) if !self.is_cancelled() => {
                    set_value(self.store.as_ref(), keys::CONVERSATION_SUMMARIES, &items);
                    self.emit(SessionEvent::SummariesChanged);
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "could not load conversation list"),
            }
        }
    }

    /// Switch to a conversation and load its history.
    pub async fn select_conversation(&mut self, conversation_id: &str) {
        set_value(
            self.store.as_ref(),
            keys::CURRENT_CONVERSATION_ID,
            &Some(conversation_id.to_string()),
        );
        match self.client.conversation_messages(conversation_id).await {
            Ok(history) if !self.is_cancelled() => {
                self.messages = history;
                self.emit(SessionEvent::MessagesChanged);
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "could not load selected conversation"),
        }
    }

    /// Clear the pointer and the thread; the next send starts a new
    /// conversation on the backend.
    pub fn new_chat(&mut self) {
        set_value::<Option<String>>(self.store.as_ref(), keys::CURRENT_CONVERSATION_ID, &None);
        self.messages.clear();
        self.emit(SessionEvent::MessagesChanged);
    }

    /// Drop a conversation locally first (summary, pointer), then tell the
    /// backend best-effort.
    pub async fn delete_conversation(&mut self, conversation_id: &str) {
        let mut summaries = self.summaries();
        summaries.retain(|s| s.id != conversation_id);
        set_value(self.store.as_ref(), keys::CONVERSATION_SUMMARIES, &summaries);
        self.emit(SessionEvent::SummariesChanged);

        if self.current_conversation_id().as_deref() == Some(conversation_id) {
            self.new_chat();
        }

        if let Err(err) = self.client.delete_conversation(conversation_id).await {
            warn!(error = %err, "backend delete failed");
        }
    }

    /// Ask the backend for a text summary of the current conversation.
    pub async fn summarize(&self) -> Result<String> {
        let conversation_id = self
            .current_conversation_id()
            .ok_or_else(|| anyhow!("no active conversation to summarize"))?;
        self.client
            .summarize_conversation(&conversation_id)
            .await
            .context("summarize request failed")
    }
}
