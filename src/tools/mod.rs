//! Tools offered to the chat model.
//!
//! One tool today: `search_diary`, semantic search with optional date and
//! mood filters. Declarations use the Ollama function-calling format and are
//! generated from the same structs that decode the arguments.

pub mod search_diary;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::Value;
use thiserror::Error;

use crate::config::EchoConfig;
use crate::embedding::EmbeddingProvider;
use crate::llm::ToolInvocation;

/// How a tool run can fail. None of these abort the turn — the chat engine
/// degrades to an empty result payload and lets the model answer without
/// retrieved context.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("malformed tool call: {0}")]
    MalformedCall(String),
    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("unknown tool: {0}")]
    Unknown(String),
}

/// What a tool run hands back: the JSON payload for the model's tool-result
/// turn, plus the search query (if any) for conversation stats.
#[derive(Debug, Clone)]
pub struct ToolReply {
    pub payload: String,
    pub search_query: Option<String>,
}

/// Tool executor shared across chat sessions. Holds shared state (db
/// connection, embedding provider, config) and dispatches invocations by
/// declared name.
#[derive(Clone)]
pub struct DiaryTools {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    config: Arc<EchoConfig>,
}

impl DiaryTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        config: Arc<EchoConfig>,
    ) -> Self {
        Self {
            db,
            embedding,
            config,
        }
    }

    /// Declarations passed to the model on tool-enabled rounds.
    pub fn declarations(&self) -> Vec<Value> {
        vec![search_diary::declaration()]
    }

    /// Execute one tool invocation. Callers decide how a failure degrades;
    /// the chat engine substitutes [`search_diary::failure_payload`] and
    /// keeps the conversation going.
    pub async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolReply, ToolError> {
        match invocation.name.as_str() {
            search_diary::TOOL_NAME => {
                search_diary::execute(
                    Arc::clone(&self.db),
                    Arc::clone(&self.embedding),
                    Arc::clone(&self.config),
                    &invocation.arguments,
                )
                .await
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }
}
