//! Internal helper functions.

use chrono::{DateTime, Utc};

use crate::types::Timestamp;

/// Convert a chrono DateTime to an OpenPGP timestamp.
///
/// Instants before the epoch map to 0, instants past 2106 saturate.
pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    let secs = dt.timestamp();
    if secs <= 0 {
        0
    } else {
        u32::try_from(secs).unwrap_or(u32::MAX)
    }
}

/// The current instant, or the configured reference time if there is one.
pub(crate) fn current_timestamp(reference: Option<DateTime<Utc>>) -> Timestamp {
    datetime_to_timestamp(reference.unwrap_or_else(Utc::now))
}

/// Split a mail address into local part and domain.
///
/// Returns `None` unless there is exactly one `@` with text on both sides.
pub(crate) fn split_email(email: &str) -> Option<(&str, &str)> {
    let mut parts = email.split('@');
    let local = parts.next()?;
    let domain = parts.next()?;
    if parts.next().is_some() || local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local, domain))
}

/// Extract the mail address from a user id.
///
/// The address inside the last pair of angle brackets is used; a user id
/// consisting of nothing but an address is accepted too. The result is
/// lowercased.
pub(crate) fn extract_email(user_id: &str) -> Option<String> {
    let candidate = match (user_id.rfind('<'), user_id.rfind('>')) {
        (Some(start), Some(end)) if start < end => &user_id[start + 1..end],
        (None, None) => user_id.trim(),
        _ => return None,
    };
    split_email(candidate)?;
    if candidate.chars().any(char::is_whitespace) {
        return None;
    }
    Some(candidate.to_lowercase())
}

/// True when `s` looks like a bare mail address.
pub(crate) fn is_valid_mailbox(s: &str) -> bool {
    match split_email(s) {
        Some((_, domain)) => {
            !s.chars().any(|c| c.is_whitespace() || c == '<' || c == '>')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// Case-insensitive substring test on ASCII.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
