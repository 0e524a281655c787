//! The `search_diary` tool — semantic search over diary entries, offered to
//! the chat model during diary conversations.

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::EchoConfig;
use crate::diary::search::{self, SearchParams};
use crate::diary::store;
use crate::diary::types::DateRange;
use crate::embedding::EmbeddingProvider;

use super::{ToolError, ToolReply};

/// Wire name of the tool, as declared to the model.
pub const TOOL_NAME: &str = "search_diary";

/// Arguments the model supplies when invoking `search_diary`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchDiaryParams {
    /// Natural language text to search for (1–1000 characters).
    #[schemars(
        description = "Text to search for in diary entries, e.g. 'hiking', 'work stress', 'time with friends'"
    )]
    pub query: String,

    /// Maximum number of results (1–20). Defaults to 10.
    #[schemars(description = "Maximum number of results to return (1-20). Defaults to 10.")]
    pub limit: Option<i64>,

    /// Restrict candidates to a date window before any ranking happens.
    #[schemars(
        description = "Optional date window with 'start' and/or 'end' as ISO dates like '2026-08-01'. Use when the user asks about a specific period."
    )]
    pub date_range: Option<DateRange>,

    /// Only match entries tagged with at least one of these moods.
    #[schemars(
        description = "Only return entries tagged with at least one of these moods, e.g. ['calm', 'anxious']"
    )]
    pub mood_tags: Option<Vec<String>>,
}

/// The Ollama function-calling declaration for this tool. The parameters
/// schema is generated from [`SearchDiaryParams`] so the wire contract and
/// the decode type cannot drift apart.
pub fn declaration() -> Value {
    let mut parameters: Value = schemars::schema_for!(SearchDiaryParams).into();
    if let Some(obj) = parameters.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": "Search the user's diary entries by meaning. Use for content questions like 'when did I last write about hiking?' or 'what did I say about work?'",
            "parameters": parameters,
        }
    })
}

/// Payload used when the tool itself failed. The conversation still
/// proceeds — the model sees an empty result set and answers without it.
pub fn failure_payload() -> String {
    json!({
        "success": false,
        "results": [],
        "count": 0,
        "error": "diary search is temporarily unavailable"
    })
    .to_string()
}

/// Run one `search_diary` invocation and build the JSON payload handed back
/// to the model.
pub async fn execute(
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    config: Arc<EchoConfig>,
    arguments: &Value,
) -> Result<ToolReply, ToolError> {
    let params: SearchDiaryParams = serde_json::from_value(arguments.clone())
        .map_err(|e| ToolError::MalformedCall(format!("search_diary arguments: {e}")))?;

    let query = search::normalize_query(&params.query).to_string();
    if query.is_empty() {
        return Ok(ToolReply {
            payload: json!({"success": false, "error": "Query cannot be empty"}).to_string(),
            search_query: None,
        });
    }

    let limit = search::clamp_limit(params.limit);
    tracing::info!(query = %query, limit, "search_diary called");

    // Embed the query off the async runtime (CPU-heavy)
    let provider = Arc::clone(&embedding);
    let query_for_embed = query.clone();
    let query_embedding =
        tokio::task::spawn_blocking(move || provider.embed_query(&query_for_embed))
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("embedding task failed: {e}")))?
            .map_err(|e| ToolError::ExecutionFailed(format!("embedding failed: {e}")))?;

    // Score candidates under the connection lock (sync DB ops)
    let search_params = SearchParams {
        limit,
        similarity_threshold: config.retrieval.similarity_threshold,
        date_range: params.date_range,
        mood_tags: params.mood_tags,
    };
    let (matches, total_searchable) = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        let matches = search::search_entries(&conn, &query_embedding, &search_params)?;
        let total = store::count_embedded_entries(&conn)?;
        Ok::<_, anyhow::Error>((matches, total))
    })
    .await
    .map_err(|e| ToolError::ExecutionFailed(format!("db task failed: {e}")))?
    .map_err(|e| ToolError::ExecutionFailed(format!("search failed: {e}")))?;

    tracing::info!(matches = matches.len(), "diary search complete");

    let count = matches.len();
    let payload = json!({
        "success": true,
        "results": matches,
        "count": count,
        "query": query,
        "total_searchable_entries": total_searchable,
    })
    .to_string();

    Ok(ToolReply {
        payload,
        search_query: Some(query),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::diary::store::insert_entry;
    use crate::embedding::EMBEDDING_DIM;

    /// Embedding stub that returns the same unit vector for every text.
    struct FixedProvider {
        vector: Vec<f32>,
    }

    impl EmbeddingProvider for FixedProvider {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(self.vector.clone())
        }
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[dim] = 1.0;
        v
    }

    fn fixtures(query_dim: usize) -> (Arc<Mutex<Connection>>, Arc<dyn EmbeddingProvider>, Arc<EchoConfig>) {
        let conn = db::open_memory_database().unwrap();
        let db = Arc::new(Mutex::new(conn));
        let embedding: Arc<dyn EmbeddingProvider> = Arc::new(FixedProvider {
            vector: spike(query_dim),
        });
        let config = Arc::new(EchoConfig::default());
        (db, embedding, config)
    }

    #[test]
    fn declaration_uses_ollama_function_format() {
        let decl = declaration();

        assert_eq!(decl["type"], "function");
        assert_eq!(decl["function"]["name"], "search_diary");
        assert!(decl["function"]["parameters"]["properties"]["query"].is_object());
        assert!(decl["function"]["parameters"].get("$schema").is_none());
    }

    #[test]
    fn params_tolerate_missing_optional_fields() {
        let params: SearchDiaryParams =
            serde_json::from_value(json!({"query": "hiking"})).unwrap();

        assert_eq!(params.query, "hiking");
        assert!(params.limit.is_none());
        assert!(params.date_range.is_none());
        assert!(params.mood_tags.is_none());
    }

    #[tokio::test]
    async fn execute_returns_matches_and_records_query() {
        let (db, embedding, config) = fixtures(0);
        {
            let conn = db.lock().unwrap();
            insert_entry(&conn, "Long walk on the ridge trail", &[], &spike(0)).unwrap();
            insert_entry(&conn, "Budget meeting notes", &[], &spike(100)).unwrap();
        }

        let reply = execute(
            Arc::clone(&db),
            embedding,
            config,
            &json!({"query": "hiking"}),
        )
        .await
        .unwrap();

        assert_eq!(reply.search_query.as_deref(), Some("hiking"));
        let payload: Value = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["count"], 1);
        assert_eq!(payload["total_searchable_entries"], 2);
        assert_eq!(payload["results"][0]["snippet"], "Long walk on the ridge trail");
    }

    #[tokio::test]
    async fn execute_with_empty_query_reports_validation_failure() {
        let (db, embedding, config) = fixtures(0);

        let reply = execute(db, embedding, config, &json!({"query": "   "}))
            .await
            .unwrap();

        assert!(reply.search_query.is_none());
        let payload: Value = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(payload["success"], false);
    }

    #[tokio::test]
    async fn execute_with_unschema_arguments_is_a_malformed_call() {
        let (db, embedding, config) = fixtures(0);

        let result = execute(db, embedding, config, &json!({"limit": 5})).await;

        assert!(matches!(result, Err(ToolError::MalformedCall(_))));
    }

    #[tokio::test]
    async fn execute_on_empty_store_returns_empty_results() {
        let (db, embedding, config) = fixtures(0);

        let reply = execute(db, embedding, config, &json!({"query": "anything"}))
            .await
            .unwrap();

        let payload: Value = serde_json::from_str(&reply.payload).unwrap();
        assert_eq!(payload["success"], true);
        assert_eq!(payload["count"], 0);
        assert_eq!(payload["results"].as_array().map(Vec::len), Some(0));
    }
}
