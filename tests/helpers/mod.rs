#![allow(dead_code)]

use echo_journal::db;
use echo_journal::diary::store;
use echo_journal::embedding::EMBEDDING_DIM;
use rusqlite::{params, Connection};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Each seed produces a distinct, orthogonal vector.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// Normalized blend of two spike embeddings — cosine similarity ~0.707
/// against each component.
pub fn blended_embedding(seed_a: usize, seed_b: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    let x = 1.0_f32 / 2.0_f32.sqrt();
    v[seed_a % EMBEDDING_DIM] = x;
    v[seed_b % EMBEDDING_DIM] = x;
    v
}

/// Insert an entry and pin its created_at for deterministic ordering.
/// Returns the entry ID.
pub fn seed_entry(
    conn: &Connection,
    content: &str,
    tags: &[&str],
    embedding: &[f32],
    created_at: &str,
) -> String {
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    let entry = store::insert_entry(conn, content, &tags, embedding).unwrap();
    conn.execute(
        "UPDATE entries SET created_at = ?1 WHERE id = ?2",
        params![created_at, entry.id],
    )
    .unwrap();
    entry.id
}
