//! Data models for the LUG site backend.
//!
//! Field names serialize to the camelCase keys the site frontend reads.

mod activity;
mod event;
mod message;
mod user;

pub use activity::*;
pub use event::*;
pub use message::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage. Fixed width, so text order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp; unparseable values read as absent.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}
