//! Entry write path — embedding at ingest, plus the read helpers the CLI
//! and API need.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::diary::embedding_to_bytes;
use crate::diary::types::Entry;

/// Insert a new entry with its precomputed embedding. Returns the stored record.
pub fn insert_entry(
    conn: &Connection,
    content: &str,
    mood_tags: &[String],
    embedding: &[f32],
) -> Result<Entry> {
    let id = uuid::Uuid::now_v7().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    let tags_json = serde_json::to_string(mood_tags)?;

    conn.execute(
        "INSERT INTO entries (id, content, mood_tags, created_at, embedding) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, content, tags_json, created_at, embedding_to_bytes(embedding)],
    )?;

    Ok(Entry {
        id,
        content: content.to_string(),
        mood_tags: mood_tags.to_vec(),
        created_at,
        has_embedding: true,
    })
}

/// Fetch a single entry by ID.
pub fn get_entry(conn: &Connection, id: &str) -> Result<Option<Entry>> {
    let entry = conn
        .query_row(
            "SELECT id, content, mood_tags, created_at, embedding IS NOT NULL \
             FROM entries WHERE id = ?1",
            params![id],
            map_entry_row,
        )
        .optional()?;
    Ok(entry)
}

/// List entries, newest first.
pub fn list_entries(conn: &Connection, limit: usize, offset: usize) -> Result<Vec<Entry>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, mood_tags, created_at, embedding IS NOT NULL \
         FROM entries ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt
        .query_map(params![limit as i64, offset as i64], map_entry_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Total number of stored entries.
pub fn count_entries(conn: &Connection) -> Result<u64> {
    let count = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
    Ok(count)
}

/// Number of entries that currently carry an embedding.
pub fn count_embedded_entries(conn: &Connection) -> Result<u64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// All entry IDs with their content, for bulk re-embedding.
pub fn all_entries_for_embedding(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT id, content FROM entries ORDER BY created_at")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Replace the stored embedding for one entry.
pub fn update_embedding(conn: &Connection, id: &str, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "UPDATE entries SET embedding = ?1 WHERE id = ?2",
        params![embedding_to_bytes(embedding), id],
    )?;
    Ok(())
}

fn map_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    let tags_json: String = row.get(2)?;
    Ok(Entry {
        id: row.get(0)?,
        content: row.get(1)?,
        mood_tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        created_at: row.get(3)?,
        has_embedding: row.get(4)?,
    })
}
