/// How a turn's live phase ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnStatus {
    Completed,
    Failed(String),
    Cancelled,
}

/// Events broadcast by the session for decoupled consumers.
///
/// Everything is a notification, not a payload carrier: consumers re-read
/// the session (or the store) for current state, which keeps delivery
/// order-insensitive.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    TurnStarted,
    /// An incremental fragment arrived and the placeholder was updated.
    TextDelta { content: String },
    TurnEnded { status: TurnStatus },
    /// The in-memory message list changed shape (append/replace/clear).
    MessagesChanged,
    /// The cached summary list changed.
    SummariesChanged,
}
