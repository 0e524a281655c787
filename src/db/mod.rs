pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the echo-journal database at the given path, with schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    // Enable foreign keys
    conn.pragma_update(None, "foreign_keys", "ON")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Database health snapshot produced by [`check_database_health`].
pub struct HealthReport {
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub entry_count: u64,
    pub embedded_entry_count: u64,
    pub conversation_count: u64,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Run diagnostics over an open database: schema version, stored embedding
/// model, row counts, and SQLite's own integrity check.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version =
        migrations::get_schema_version(conn).context("failed to read schema version")?;
    let embedding_model =
        migrations::get_embedding_model(conn).context("failed to read embedding model")?;

    let entry_count: u64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;
    let embedded_entry_count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let conversation_count: u64 =
        conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
    let integrity_ok = integrity_details == "ok";

    Ok(HealthReport {
        schema_version,
        embedding_model,
        entry_count,
        embedded_entry_count,
        conversation_count,
        integrity_ok,
        integrity_details,
    })
}
