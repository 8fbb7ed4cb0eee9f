use chrono::{DateTime, Utc};

/// Coerce the backend's loose timestamp formats into RFC 3339 UTC:
/// `"2026-01-02 03:04:05"` gains a `T`, date-only strings get midnight,
/// and a missing timezone is assumed to be UTC.
fn coerce_to_utc_iso(input: &str) -> String {
    let mut s = input.trim().to_string();
    if s.is_empty() {
        return s;
    }
    if s.contains(' ') && !s.contains('T') {
        s = s.replacen(' ', "T", 1);
    }
    if s.len() == 10 && s.bytes().filter(|b| *b == b'-').count() == 2 {
        // Date only: assume midnight UTC.
        return format!("{}T00:00:00Z", s);
    }
    let has_timezone = s.ends_with('Z')
        || s.ends_with('z')
        || s
            .rsplit_once(['+', '-'])
            .is_some_and(|(head, tail)| head.contains('T') && tail.len() <= 5 && tail.contains(':'));
    if !has_timezone {
        s.push('Z');
    }
    s
}

/// Parse a backend timestamp, `None` when it cannot be made sense of.
pub fn parse_utc_date(iso: &str) -> Option<DateTime<Utc>> {
    let normalized = coerce_to_utc_iso(iso);
    if normalized.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Human-readable age of a timestamp: "just now", "5m ago", "3h ago",
/// "2d ago". Unparseable input renders as an empty string.
pub fn time_ago(iso: Option<&str>) -> String {
    let Some(date) = iso.and_then(parse_utc_date) else {
        return String::new();
    };
    let minutes = (Utc::now() - date).num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    format!("{}d ago", hours / 24)
}
