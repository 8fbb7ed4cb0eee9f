//! Local state and orchestration for the Eloquent chat client.
//!
//! Sits between the backend protocol (`eloquent-client`) and whatever
//! presentation layer consumes it: persisted key-value cache with change
//! notification, auth session state, the streaming turn orchestrator, and
//! the summary builder that feeds conversation list views.

pub mod auth;
pub mod session;
pub mod storage;
pub mod summary;
pub mod time;

pub use auth::{AuthSession, UserProfile};
pub use session::{ChatSession, SessionError, SessionEvent, TurnOutcome, TurnStatus};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StoredValue};
pub use summary::{build_conversation_summary, clamp, upsert_summary};
pub use time::{parse_utc_date, time_ago};
