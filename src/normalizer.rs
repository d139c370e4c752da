//! Field normalization
//!
//! Transcript entries come from several Claude Code versions with different
//! field spellings. Session identity is resolved by probing an ordered table
//! of key paths (snake_case, camelCase, nested variants); timestamps are
//! parsed through a small cascade of ISO-8601 shapes. Neither operation ever
//! fails: a missing session id yields the [`UNKNOWN_SESSION`] sentinel and a
//! missing or malformed timestamp yields `None`.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Sentinel for entries with no recognizable session identifier.
pub const UNKNOWN_SESSION: &str = "unknown_session";

/// Ordered key paths probed for a session identifier; first hit wins.
const SESSION_ID_PATHS: &[&[&str]] = &[
    &["sessionId"],
    &["session_id"],
    &["sessionID"],
    &["conversationId"],
    &["conversation_id"],
    &["message", "session_id"],
    &["message", "sessionId"],
    &["message", "conversation_id"],
    &["session", "id"],
];

/// Key names probed for a timestamp, in order.
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "time", "created_at", "createdAt"];

fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = raw;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str().filter(|s| !s.is_empty())
}

/// Extract the session identifier from a raw entry, probing each candidate
/// path in order. Never errors.
pub fn extract_session_id(raw: &Value) -> String {
    for path in SESSION_ID_PATHS {
        if let Some(id) = lookup(raw, path) {
            return id.to_string();
        }
    }
    UNKNOWN_SESSION.to_string()
}

/// Extract and parse the entry timestamp. Unparseable or absent timestamps
/// yield `None` and are excluded from session start/end bounds.
pub fn extract_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    for key in TIMESTAMP_KEYS {
        if let Some(s) = raw.get(*key).and_then(Value::as_str) {
            if let Ok(ts) = parse_timestamp(s) {
                return Some(ts);
            }
        }
    }
    None
}

/// Parse a timestamp string into a DateTime<Utc>.
/// Handles Z suffix, explicit offsets, and naive datetimes (assumed UTC),
/// with or without fractional seconds.
pub fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>> {
    let timestamp = if timestamp_str.ends_with('Z') {
        timestamp_str.replace('Z', "+00:00")
    } else {
        timestamp_str.to_string()
    };

    // Try parsing as ISO 8601
    if let Ok(dt) = DateTime::parse_from_rfc3339(&timestamp) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try parsing as naive datetime and assume UTC
    if let Ok(naive) = NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    // Space-separated variant seen in some exports
    if let Ok(naive) = NaiveDateTime::parse_from_str(&timestamp, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    anyhow::bail!("Failed to parse timestamp: {}", timestamp_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_camel_case() {
        let raw = json!({"sessionId": "abc-123"});
        assert_eq!(extract_session_id(&raw), "abc-123");
    }

    #[test]
    fn test_session_id_snake_case() {
        let raw = json!({"session_id": "abc-123"});
        assert_eq!(extract_session_id(&raw), "abc-123");
    }

    #[test]
    fn test_session_id_nested() {
        let raw = json!({"message": {"session_id": "nested-id"}});
        assert_eq!(extract_session_id(&raw), "nested-id");
    }

    #[test]
    fn test_session_id_probe_order() {
        // camelCase top-level key beats the nested variant
        let raw = json!({"sessionId": "top", "message": {"session_id": "nested"}});
        assert_eq!(extract_session_id(&raw), "top");
    }

    #[test]
    fn test_session_id_sentinel() {
        let raw = json!({"type": "assistant"});
        assert_eq!(extract_session_id(&raw), UNKNOWN_SESSION);
        let raw = json!({"sessionId": ""});
        assert_eq!(extract_session_id(&raw), UNKNOWN_SESSION);
    }

    #[test]
    fn test_parse_z_suffix() {
        assert!(parse_timestamp("2024-01-01T12:00:00.000Z").is_ok());
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timestamp("2024-01-01T12:00:00.000+00:00").is_ok());
    }

    #[test]
    fn test_parse_naive() {
        assert!(parse_timestamp("2024-01-01T12:00:00.000").is_ok());
        assert!(parse_timestamp("2024-01-01T12:00:00").is_ok());
    }

    #[test]
    fn test_parse_space_separated() {
        assert!(parse_timestamp("2024-01-01 12:00:00").is_ok());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_timestamp("invalid").is_err());
    }

    #[test]
    fn test_extract_timestamp_absent() {
        let raw = json!({"type": "user"});
        assert_eq!(extract_timestamp(&raw), None);
    }

    #[test]
    fn test_extract_timestamp_malformed() {
        let raw = json!({"timestamp": "not a date"});
        assert_eq!(extract_timestamp(&raw), None);
    }

    #[test]
    fn test_extract_timestamp_alternate_key() {
        let raw = json!({"created_at": "2024-01-01T12:00:00Z"});
        assert!(extract_timestamp(&raw).is_some());
    }
}
