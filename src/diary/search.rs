//! The embedding store accessor — read-only cosine-similarity search over
//! stored entries.
//!
//! Filters (date range, mood tags) exclude candidates before any scoring.
//! Surviving entries are scored against the query vector, thresholded, and
//! ordered by similarity with most-recent-first tie-breaking.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use crate::diary::bytes_to_embedding;
use crate::diary::types::DateRange;

// ── Public types ──────────────────────────────────────────────────────────────

/// A single ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct EntryMatch {
    pub entry_id: String,
    pub snippet: String,
    pub similarity: f32,
    pub timestamp: String,
    pub mood_tags: Vec<String>,
}

/// Knobs for one search call. `limit` is pre-clamped by [`clamp_limit`].
pub struct SearchParams {
    pub limit: usize,
    pub similarity_threshold: f32,
    pub date_range: Option<DateRange>,
    pub mood_tags: Option<Vec<String>>,
}

/// Hard cap on results per search.
pub const MAX_LIMIT: usize = 20;
/// Limit used when the caller asks for something out of range.
pub const DEFAULT_LIMIT: usize = 10;
/// Queries longer than this are truncated before embedding.
pub const MAX_QUERY_CHARS: usize = 1000;

/// Snippet length for match payloads.
const SNIPPET_CHARS: usize = 240;

// ── Public API ────────────────────────────────────────────────────────────────

/// Score every stored entry embedding against `query_embedding` and return
/// the top matches.
///
/// Read-only: no access tracking, no writes. An empty store (or a filter
/// that excludes everything) yields an empty list, never an error.
pub fn search_entries(
    conn: &Connection,
    query_embedding: &[f32],
    params: &SearchParams,
) -> Result<Vec<EntryMatch>> {
    let (start_bound, end_bound) = date_bounds(params.date_range.as_ref());

    // 1. Fetch candidates — date filtering happens here, before any scoring
    let mut sql = String::from(
        "SELECT id, content, mood_tags, created_at, embedding \
         FROM entries WHERE embedding IS NOT NULL",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(bound) = start_bound {
        binds.push(bound);
        sql.push_str(&format!(" AND created_at >= ?{}", binds.len()));
    }
    if let Some(bound) = end_bound {
        binds.push(bound);
        sql.push_str(&format!(" AND created_at < ?{}", binds.len()));
    }
    sql.push_str(" ORDER BY created_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let bind_refs: Vec<&dyn rusqlite::types::ToSql> = binds
        .iter()
        .map(|b| b as &dyn rusqlite::types::ToSql)
        .collect();

    struct CandidateRow {
        id: String,
        content: String,
        mood_tags: Vec<String>,
        created_at: String,
        embedding: Vec<u8>,
    }

    let candidates = stmt
        .query_map(bind_refs.as_slice(), |row| {
            let tags_json: String = row.get(2)?;
            Ok(CandidateRow {
                id: row.get(0)?,
                content: row.get(1)?,
                mood_tags: serde_json::from_str(&tags_json).unwrap_or_default(),
                created_at: row.get(3)?,
                embedding: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // 2. Mood filter, then score survivors
    let mut matches: Vec<EntryMatch> = Vec::new();
    for row in candidates {
        if let Some(ref wanted) = params.mood_tags {
            if !wanted.is_empty() && !mood_tags_intersect(&row.mood_tags, wanted) {
                continue;
            }
        }

        let stored = match bytes_to_embedding(&row.embedding) {
            Ok(v) => v,
            Err(e) => {
                // Stale blob from another model — skip, don't fail the search
                tracing::warn!(entry_id = %row.id, error = %e, "skipping undecodable embedding");
                continue;
            }
        };

        let similarity = cosine_similarity(query_embedding, &stored);
        if similarity < params.similarity_threshold {
            continue;
        }

        matches.push(EntryMatch {
            entry_id: row.id,
            snippet: truncate_snippet(&row.content, SNIPPET_CHARS),
            similarity,
            timestamp: row.created_at,
            mood_tags: row.mood_tags,
        });
    }

    // 3. Rank: similarity descending, ties broken by most-recent timestamp
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    matches.truncate(params.limit);

    Ok(matches)
}

/// Clamp a requested result count to `1..=MAX_LIMIT`, falling back to
/// [`DEFAULT_LIMIT`] when out of range or absent.
pub fn clamp_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 1 && n <= MAX_LIMIT as i64 => n as usize,
        _ => DEFAULT_LIMIT,
    }
}

/// Trim and cap query text before embedding.
pub fn normalize_query(query: &str) -> &str {
    let trimmed = query.trim();
    match trimmed.char_indices().nth(MAX_QUERY_CHARS) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Cosine similarity with a zero-norm guard.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Resolve an optional date range into RFC 3339 SQL bounds.
///
/// The end bound is exclusive at the start of the following day, which makes
/// the requested end *date* inclusive. Unparseable bounds are ignored with a
/// warning rather than failing the search.
fn date_bounds(range: Option<&DateRange>) -> (Option<String>, Option<String>) {
    let Some(range) = range else {
        return (None, None);
    };

    let start = range.start.as_deref().and_then(|s| match parse_day(s) {
        Some(day) => Some(day_start_utc(day)),
        None => {
            tracing::warn!(value = %s, "ignoring unparseable date range start");
            None
        }
    });

    let end = range.end.as_deref().and_then(|s| match parse_day(s) {
        Some(day) => day
            .checked_add_days(chrono::Days::new(1))
            .map(day_start_utc),
        None => {
            tracing::warn!(value = %s, "ignoring unparseable date range end");
            None
        }
    });

    (start, end)
}

/// Parse `YYYY-MM-DD`, falling back to the date part of an RFC 3339 timestamp.
fn parse_day(s: &str) -> Option<chrono::NaiveDate> {
    if let Ok(day) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(day);
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.date_naive())
}

fn day_start_utc(day: chrono::NaiveDate) -> String {
    chrono::NaiveDateTime::new(day, chrono::NaiveTime::MIN)
        .and_utc()
        .to_rfc3339()
}

/// Case-insensitive set intersection check.
fn mood_tags_intersect(entry_tags: &[String], wanted: &[String]) -> bool {
    entry_tags
        .iter()
        .any(|t| wanted.iter().any(|w| w.eq_ignore_ascii_case(t)))
}

/// Truncate content to max_chars at a char boundary, appending "..." if cut.
fn truncate_snippet(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        content.to_string()
    } else {
        let end = content
            .char_indices()
            .take_while(|(i, _)| *i < max_chars)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(max_chars);
        format!("{}...", &content[..end])
    }
}
