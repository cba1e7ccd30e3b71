//! Shared timestamp/event helpers for trace entries and dispatch receipts.

use chrono::{DateTime, SecondsFormat, Utc};
use ulid::Ulid;

/// RFC 3339 UTC timestamp with millisecond precision (e.g. `2026-10-18T09:14:03.271Z`).
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

pub fn format_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filesystem-safe, lexically sortable form of an ISO timestamp: `:` and `.` become `-`.
pub fn file_stamp(iso: &str) -> String {
    iso.replace([':', '.'], "-")
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}
