//! SQL DDL for all echo-journal tables.
//!
//! Defines the `entries`, `conversations`, and `schema_meta` tables. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization. Entry embeddings are
//! stored inline as little-endian f32 BLOBs (384 dims).

use rusqlite::Connection;

/// All schema DDL statements for echo-journal's core tables.
const SCHEMA_SQL: &str = r#"
-- Journal entries with precomputed embeddings
CREATE TABLE IF NOT EXISTS entries (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    mood_tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_entries_created ON entries(created_at);

-- Saved conversation transcripts
CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'chat' CHECK(kind IN ('chat','call')),
    transcription TEXT NOT NULL,
    duration_seconds INTEGER NOT NULL DEFAULT 0,
    message_count INTEGER NOT NULL DEFAULT 0,
    search_queries TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_kind ON conversations(kind);
CREATE INDEX IF NOT EXISTS idx_conversations_created ON conversations(created_at);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
