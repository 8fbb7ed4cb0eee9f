use eloquent_client::{ConversationSummary, Message, Role};

const TITLE_MAX: usize = 60;
const PREVIEW_MAX: usize = 80;

/// Collapse whitespace runs to single spaces, trim, and truncate to `max`
/// characters with a trailing ellipsis. The cut is at the exact character
/// limit, not a word boundary.
pub fn clamp(text: &str, max: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max {
        return normalized;
    }
    let mut clipped: String = normalized.chars().take(max).collect();
    clipped.push('…');
    clipped
}

/// Derive the compact list-view record for a conversation.
///
/// Title comes from the first user message, preview from the last
/// assistant message (or the last message when no assistant spoke),
/// created_at from the first message's timestamp.
pub fn build_conversation_summary(
    messages: &[Message],
    conversation_id: &str,
) -> ConversationSummary {
    let first_user = messages.iter().find(|m| m.role == Role::User);
    let last_assistant = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .or_else(|| messages.last());

    ConversationSummary {
        id: conversation_id.to_string(),
        title: clamp(
            first_user.map(|m| m.content.as_str()).unwrap_or("New chat"),
            TITLE_MAX,
        ),
        last_message_preview: last_assistant.map(|m| clamp(&m.content, PREVIEW_MAX)),
        created_at: Some(
            messages
                .first()
                .and_then(|m| m.created_at.clone())
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        ),
    }
}

/// Insert or refresh a summary: any entry with the same id is removed, the
/// new one goes first. Keeps the list most-recently-active-first with at
/// most one entry per conversation.
pub fn upsert_summary(summaries: &mut Vec<ConversationSummary>, summary: ConversationSummary) {
    summaries.retain(|s| s.id != summary.id);
    summaries.insert(0, summary);
}
