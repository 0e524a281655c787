//! Saved conversation records — the "keep this conversation" path.
//!
//! A conversation only reaches this table when the user explicitly saves it;
//! abandoned sessions are never written. Records store the rendered
//! transcription plus summary fields, not the raw turn structure.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Public types ──────────────────────────────────────────────────────────────

/// How the conversation was held. `Call` is the voice interface, `Chat` the
/// typed one; both produce the same record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Chat,
    Call,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Chat => "chat",
            ConversationKind::Call => "call",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chat" => Some(ConversationKind::Chat),
            "call" => Some(ConversationKind::Call),
            _ => None,
        }
    }
}

/// A saved conversation as stored.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub id: String,
    pub kind: ConversationKind,
    pub transcription: String,
    pub duration_seconds: i64,
    pub message_count: i64,
    pub search_queries_used: Vec<String>,
    pub created_at: String,
}

/// Aggregates over all saved conversations.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub total_conversations: i64,
    pub call_conversations: i64,
    pub chat_conversations: i64,
    pub total_duration: i64,
    pub total_messages: i64,
    pub average_duration: f64,
    pub average_messages: f64,
    pub most_recent: Option<String>,
}

/// Most records one list call may return.
pub const MAX_LIST_LIMIT: usize = 200;
/// List page size when the caller asks for something out of range.
pub const DEFAULT_LIST_LIMIT: usize = 50;

// ── Public API ────────────────────────────────────────────────────────────────

/// Mint a conversation ID. The tail of a v7 UUID is its random section, so
/// same-millisecond saves still get distinct IDs.
pub fn new_conversation_id() -> String {
    let simple = Uuid::now_v7().simple().to_string();
    format!("conv_{}", &simple[simple.len() - 12..])
}

/// Persist a finished conversation. Returns the stored record.
pub fn insert_conversation(
    conn: &Connection,
    kind: ConversationKind,
    transcription: &str,
    duration_seconds: i64,
    message_count: i64,
    search_queries: &[String],
) -> Result<ConversationRecord> {
    let id = new_conversation_id();
    let created_at = chrono::Utc::now().to_rfc3339();
    let queries_json = serde_json::to_string(search_queries)?;

    conn.execute(
        "INSERT INTO conversations \
         (id, kind, transcription, duration_seconds, message_count, search_queries, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            kind.as_str(),
            transcription,
            duration_seconds.max(0),
            message_count.max(0),
            queries_json,
            created_at
        ],
    )?;

    Ok(ConversationRecord {
        id,
        kind,
        transcription: transcription.to_string(),
        duration_seconds: duration_seconds.max(0),
        message_count: message_count.max(0),
        search_queries_used: search_queries.to_vec(),
        created_at,
    })
}

/// Fetch one saved conversation by ID.
pub fn get_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRecord>> {
    let record = conn
        .query_row(
            "SELECT id, kind, transcription, duration_seconds, message_count, \
                    search_queries, created_at \
             FROM conversations WHERE id = ?1",
            params![id],
            map_conversation_row,
        )
        .optional()?;
    Ok(record)
}

/// List saved conversations, newest first, optionally filtered by kind.
pub fn list_conversations(
    conn: &Connection,
    limit: usize,
    offset: usize,
    kind: Option<ConversationKind>,
) -> Result<Vec<ConversationRecord>> {
    let rows = match kind {
        Some(kind) => {
            let mut stmt = conn.prepare(
                "SELECT id, kind, transcription, duration_seconds, message_count, \
                        search_queries, created_at \
                 FROM conversations WHERE kind = ?1 \
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            )?;
            let records = stmt
                .query_map(
                    params![kind.as_str(), limit as i64, offset as i64],
                    map_conversation_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            records
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, kind, transcription, duration_seconds, message_count, \
                        search_queries, created_at \
                 FROM conversations \
                 ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )?;
            let records = stmt
                .query_map(params![limit as i64, offset as i64], map_conversation_row)?
                .collect::<Result<Vec<_>, _>>()?;
            records
        }
    };
    Ok(rows)
}

/// Update an existing record. `None` fields keep their stored value. Returns
/// the refreshed record, or `None` if the ID is unknown.
pub fn update_conversation(
    conn: &Connection,
    id: &str,
    transcription: Option<&str>,
    duration_seconds: Option<i64>,
    message_count: Option<i64>,
    search_queries: Option<&[String]>,
) -> Result<Option<ConversationRecord>> {
    let queries_json = match search_queries {
        Some(queries) => Some(serde_json::to_string(queries)?),
        None => None,
    };

    let changed = conn.execute(
        "UPDATE conversations SET \
             transcription = COALESCE(?2, transcription), \
             duration_seconds = COALESCE(?3, duration_seconds), \
             message_count = COALESCE(?4, message_count), \
             search_queries = COALESCE(?5, search_queries) \
         WHERE id = ?1",
        params![id, transcription, duration_seconds, message_count, queries_json],
    )?;

    if changed == 0 {
        return Ok(None);
    }
    get_conversation(conn, id)
}

/// Delete a saved conversation. Returns whether a record was removed.
pub fn delete_conversation(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Clamp a requested page size to `1..=MAX_LIST_LIMIT`.
pub fn clamp_list_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 1 && n <= MAX_LIST_LIMIT as i64 => n as usize,
        _ => DEFAULT_LIST_LIMIT,
    }
}

/// Aggregate statistics over all saved conversations. An empty table yields
/// all-zero stats rather than an error.
pub fn conversation_stats(conn: &Connection) -> Result<ConversationStats> {
    let (total, calls, chats, duration, messages, most_recent) = conn.query_row(
        "SELECT COUNT(*), \
                COALESCE(SUM(CASE WHEN kind = 'call' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(CASE WHEN kind = 'chat' THEN 1 ELSE 0 END), 0), \
                COALESCE(SUM(duration_seconds), 0), \
                COALESCE(SUM(message_count), 0), \
                MAX(created_at) \
         FROM conversations",
        [],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        },
    )?;

    let (average_duration, average_messages) = if total > 0 {
        (
            duration as f64 / total as f64,
            messages as f64 / total as f64,
        )
    } else {
        (0.0, 0.0)
    };

    Ok(ConversationStats {
        total_conversations: total,
        call_conversations: calls,
        chat_conversations: chats,
        total_duration: duration,
        total_messages: messages,
        average_duration,
        average_messages,
        most_recent,
    })
}

fn map_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRecord> {
    let kind_text: String = row.get(1)?;
    let queries_json: String = row.get(5)?;
    Ok(ConversationRecord {
        id: row.get(0)?,
        kind: ConversationKind::parse(&kind_text).unwrap_or(ConversationKind::Chat),
        transcription: row.get(2)?,
        duration_seconds: row.get(3)?,
        message_count: row.get(4)?,
        search_queries_used: serde_json::from_str(&queries_json).unwrap_or_default(),
        created_at: row.get(6)?,
    })
}
