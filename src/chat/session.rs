//! Conversation session state.
//!
//! A session owns the ordered turn log for one open conversation plus the
//! search queries accumulated along the way. Turns are append-only and never
//! mutated once pushed; the orchestrator only appends after a turn fully
//! resolves, so an abandoned turn leaves no partial answer behind. Sessions
//! hold no cross-session memory — each one starts blank except for what the
//! diary search tool can retrieve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One spoken or typed turn. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// One open conversation: ordered turns plus accumulated search queries.
#[derive(Debug)]
pub struct ConversationSession {
    id: String,
    started_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
    search_queries_used: Vec<String>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: crate::conversations::new_conversation_id(),
            started_at: Utc::now(),
            turns: Vec::new(),
            search_queries_used: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn message_count(&self) -> usize {
        self.turns.len()
    }

    pub fn search_queries_used(&self) -> &[String] {
        &self.search_queries_used
    }

    /// Seconds since the session opened.
    pub fn duration_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    pub fn push_user(&mut self, content: &str) {
        self.push_turn(TurnRole::User, content, Utc::now());
    }

    /// Append a user turn stamped with when the utterance arrived, which can
    /// be earlier than when the turn finished resolving.
    pub fn push_user_at(&mut self, content: &str, at: DateTime<Utc>) {
        self.push_turn(TurnRole::User, content, at);
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.push_turn(TurnRole::Assistant, content, Utc::now());
    }

    /// Record queries used by tool rounds, skipping duplicates.
    pub fn record_search_queries<'a>(&mut self, queries: impl IntoIterator<Item = &'a str>) {
        for query in queries {
            if !self.search_queries_used.iter().any(|q| q == query) {
                self.search_queries_used.push(query.to_string());
            }
        }
    }

    /// Render the turn log as transcript lines with a session-local clock:
    /// `[HH:MM:SS] You: …` / `[HH:MM:SS] Echo: …`.
    pub fn transcription(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let elapsed = (turn.timestamp - self.started_at).num_seconds().max(0);
                let speaker = match turn.role {
                    TurnRole::User => "You",
                    TurnRole::Assistant => "Echo",
                };
                format!(
                    "[{:02}:{:02}:{:02}] {}: {}",
                    elapsed / 3600,
                    (elapsed % 3600) / 60,
                    elapsed % 60,
                    speaker,
                    turn.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push_turn(&mut self, role: TurnRole, content: &str, timestamp: DateTime<Utc>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.to_string(),
            timestamp,
        });
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}
