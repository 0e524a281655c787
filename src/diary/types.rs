//! Journal entry type definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A journal entry, matching the `entries` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    /// The full text of the entry.
    pub content: String,
    /// Mood labels attached at ingest time (e.g. `["calm", "tired"]`).
    pub mood_tags: Vec<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Whether an embedding is stored for this entry.
    pub has_embedding: bool,
}

/// An inclusive calendar-date window for search filtering.
///
/// Bounds are `YYYY-MM-DD` strings (full RFC 3339 timestamps are also
/// accepted and reduced to their date part). Either bound may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DateRange {
    /// Earliest day to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Latest day to include.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}
