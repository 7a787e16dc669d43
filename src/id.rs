//! Timestamp and artifact naming helpers
//!
//! All persisted timestamps are UTC, RFC 3339, second precision, trailing `Z`.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall-clock time in UTC
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Format a UTC timestamp the way the ledger stores it
///
/// Example: `2026-03-01T14:05:00Z`
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compact timestamp used in file names and backup suffixes
///
/// Example: `20260301_140500`
pub fn file_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d_%H%M%S").to_string()
}

/// Base name for the artifacts of one recording
///
/// Format: `{session_id}_{file_stamp}`, with anything outside `[A-Za-z0-9_-]`
/// in the session id replaced so provider ids can never escape the data dir.
pub fn artifact_base(session_id: &str, ts: DateTime<Utc>) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let safe = if safe.is_empty() { "unknown_call".to_string() } else { safe };
    format!("{}_{}", safe, file_stamp(ts))
}
