// SPDX-License-Identifier: MIT

//! Timestamp formatting shared by every envelope writer.

use chrono::Utc;

/// Current instant as an ISO-8601 UTC timestamp with a `T` separator
/// (`2026-07-26T14:03:11.512Z`), matching the wire format in every
/// envelope schema.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch, used for trigger-file disambiguation
/// (`<event>_<epoch_ms>.json`) and DLQ filename suffixes.
pub fn epoch_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Seconds since the Unix epoch, used for DLQ filename suffixes that only
/// need second-level disambiguation (`<stem>_<epoch_secs>.json`).
pub fn epoch_secs() -> u64 {
    Utc::now().timestamp().max(0) as u64
}
