//! Calendar boundary used by the command executor.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::SlotdeskError;

/// An existing event as seen by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// Event to create. Times are wall-clock in the calendar's configured zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub attendees: Vec<String>,
}

/// New time window for an existing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPatch {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Create an event and return its id.
    async fn create(&self, event: &NewEvent) -> Result<String, SlotdeskError>;

    /// First upcoming event whose summary matches `name`.
    async fn find_by_name(&self, name: &str) -> Result<Option<CalendarEvent>, SlotdeskError>;

    async fn update(&self, event_id: &str, patch: &EventPatch) -> Result<(), SlotdeskError>;

    /// Delete an event, returning the attendees it had.
    async fn delete(&self, event_id: &str) -> Result<Vec<String>, SlotdeskError>;
}

/// Canonical form used for name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().nfkd().collect::<String>().to_lowercase()
}

/// NFKD-normalized, case-insensitive exact match.
pub fn names_match(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Earliest-starting event named `name` that has not ended by `now`.
pub fn first_upcoming_match<'a>(
    events: &'a [CalendarEvent],
    name: &str,
    now: DateTime<Utc>,
) -> Option<&'a CalendarEvent> {
    events
        .iter()
        .filter(|e| e.end > now && names_match(&e.summary, name))
        .min_by_key(|e| e.start)
}
