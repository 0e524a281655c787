//! HTTP API server.
//!
//! Wires the database, embedding provider, chat engine, and speech client
//! into one axum router. Handlers stay thin: validation, then a call into
//! the owning module, then status mapping. Failures surface to clients as a
//! single apologetic message; diagnostic detail goes to the tracing log.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::chat::{greetings, prompts, ChatEngine, ChatError, ConversationSession};
use crate::config::EchoConfig;
use crate::conversations::{self, ConversationKind, ConversationRecord, ConversationStats};
use crate::db;
use crate::diary::search::{self, SearchParams};
use crate::diary::store;
use crate::diary::types::{DateRange, Entry};
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::{ModelBackend, OllamaClient};
use crate::tools::DiaryTools;
use crate::tts::{self, PiperClient, SpeechSynthesizer, SynthesisError};

/// Maximum characters accepted in one chat message.
const MAX_MESSAGE_CHARS: usize = 2000;
/// Maximum characters accepted for one synthesis request.
const MAX_TTS_CHARS: usize = 5000;
/// Maximum characters accepted for a saved transcription.
const MAX_TRANSCRIPTION_CHARS: usize = 50_000;

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<rusqlite::Connection>>,
    pub embedding: Arc<dyn EmbeddingProvider>,
    pub config: Arc<EchoConfig>,
    pub engine: Arc<ChatEngine>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

type ApiError = (StatusCode, Json<Value>);

/// Start the API server and block until ctrl-c.
pub async fn serve(config: EchoConfig) -> Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let state = build_state(config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "echo-journal API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

/// Open the DB, create the embedding provider and backend clients, and wire
/// the chat engine.
fn build_state(config: EchoConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed — run `echo-journal re-embed` to update all vectors"
            );
        }
    }
    let db = Arc::new(Mutex::new(conn));

    let provider = embedding::create_provider(&config.embedding)?;
    let embedding: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    tracing::info!("embedding provider ready");

    let config = Arc::new(config);
    let model: Arc<dyn ModelBackend> = Arc::new(OllamaClient::new(&config.chat)?);
    let tools = DiaryTools::new(db.clone(), embedding.clone(), config.clone());
    let engine = Arc::new(ChatEngine::new(model, tools, config.chat.history_window));
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(PiperClient::new(&config.tts)?);

    Ok(AppState {
        db,
        embedding,
        config,
        engine,
        synthesizer,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/diary/chat", post(diary_chat))
        .route("/diary/chat/stream", post(diary_chat_stream))
        .route("/diary/greeting", get(diary_greeting))
        .route("/diary/search-feedback", get(diary_search_feedback))
        .route("/diary/search", post(diary_search))
        .route("/entries", post(create_entry).get(list_entries))
        .route("/entries/{id}", get(get_entry))
        .route("/tts/synthesize", post(tts_synthesize))
        .route("/tts/status", get(tts_status))
        .route(
            "/conversations",
            post(save_conversation).get(list_saved_conversations),
        )
        .route(
            "/conversations/{id}",
            get(get_saved_conversation)
                .put(update_saved_conversation)
                .delete(delete_saved_conversation),
        )
        .route("/conversations/stats/summary", get(conversation_summary))
        .with_state(state)
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Log the real cause, return a generic body.
fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    tracing::error!(error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// Run a closure against the shared connection on a blocking thread.
async fn with_db<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&rusqlite::Connection) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        op(&conn)
    })
    .await
    .map_err(internal_error)?
    .map_err(internal_error)
}

fn validate_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() || message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("message must be 1 to {MAX_MESSAGE_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Rebuild a transient session from client-supplied history. Messages with
/// roles the session can't hold are skipped, not rejected.
fn session_from_history(history: &[HistoryMessage]) -> ConversationSession {
    let mut session = ConversationSession::new();
    for message in history {
        match message.role.as_str() {
            "user" => session.push_user(&message.content),
            "assistant" => session.push_assistant(&message.content),
            other => {
                tracing::warn!(role = %other, "skipping history message with unknown role");
            }
        }
    }
    session
}

// ── Health ────────────────────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ── Diary chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DiaryChatRequest {
    message: String,
    #[serde(default)]
    conversation_history: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    role: String,
    content: String,
}

async fn diary_chat(
    State(state): State<AppState>,
    Json(request): Json<DiaryChatRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_message(&request.message)?;
    let mut session = session_from_history(&request.conversation_history);

    match state.engine.process_turn(&mut session, &request.message).await {
        Ok(outcome) => Ok(Json(json!({
            "response": outcome.response,
            "tool_calls_made": outcome.tool_calls_made,
            "search_queries_used": outcome.search_queries_used,
        }))),
        Err(ChatError::ModelUnavailable(_)) => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            prompts::ERROR_APOLOGY,
        )),
    }
}

/// Same contract as [`diary_chat`], delivered as SSE: one `delta` event per
/// sentence chunk, then a `done` event with the full summary.
async fn diary_chat_stream(
    State(state): State<AppState>,
    Json(request): Json<DiaryChatRequest>,
) -> Result<Response, ApiError> {
    validate_message(&request.message)?;
    let mut session = session_from_history(&request.conversation_history);

    let outcome = match state.engine.process_turn(&mut session, &request.message).await {
        Ok(outcome) => outcome,
        Err(ChatError::ModelUnavailable(_)) => {
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                prompts::ERROR_APOLOGY,
            ));
        }
    };

    let stream = async_stream::stream! {
        for chunk in tts::split_for_streaming(&outcome.response) {
            let delta = json!({ "text": chunk }).to_string();
            yield Ok::<_, Infallible>(Event::default().event("delta").data(delta));
        }
        let summary = json!({
            "response": outcome.response,
            "tool_calls_made": outcome.tool_calls_made,
            "search_queries_used": outcome.search_queries_used,
        });
        yield Ok(Event::default().event("done").data(summary.to_string()));
    };

    Ok(Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn diary_greeting() -> Json<Value> {
    Json(json!({ "greeting": greetings::random_greeting() }))
}

async fn diary_search_feedback() -> Json<Value> {
    Json(json!({ "message": greetings::random_search_feedback() }))
}

// ── Direct diary search ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DiarySearchRequest {
    query: String,
    limit: Option<i64>,
    similarity_threshold: Option<f32>,
    date_range: Option<DateRange>,
    mood_tags: Option<Vec<String>>,
}

async fn diary_search(
    State(state): State<AppState>,
    Json(request): Json<DiarySearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let query = search::normalize_query(&request.query).to_string();
    if query.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "query must not be empty",
        ));
    }

    let provider = state.embedding.clone();
    let query_for_embed = query.clone();
    let query_embedding =
        tokio::task::spawn_blocking(move || provider.embed_query(&query_for_embed))
            .await
            .map_err(internal_error)?
            .map_err(internal_error)?;

    let params = SearchParams {
        limit: search::clamp_limit(request.limit),
        similarity_threshold: request
            .similarity_threshold
            .unwrap_or(state.config.retrieval.similarity_threshold)
            .clamp(0.0, 1.0),
        date_range: request.date_range,
        mood_tags: request.mood_tags,
    };
    let matches = with_db(&state, move |conn| {
        search::search_entries(conn, &query_embedding, &params)
    })
    .await?;

    tracing::info!(query = %query, hits = matches.len(), "direct diary search");
    Ok(Json(json!({ "matches": matches })))
}

// ── Entries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EntryCreateRequest {
    content: String,
    #[serde(default)]
    mood_tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn create_entry(
    State(state): State<AppState>,
    Json(request): Json<EntryCreateRequest>,
) -> Result<(StatusCode, Json<Entry>), ApiError> {
    let EntryCreateRequest { content, mood_tags } = request;
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "content must not be empty",
        ));
    }

    // Embedding is computed at write time so search never lags behind
    let provider = state.embedding.clone();
    let text = content.clone();
    let embedding = tokio::task::spawn_blocking(move || provider.embed(&text))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;

    let entry = with_db(&state, move |conn| {
        store::insert_entry(conn, &content, &mood_tags, &embedding)
    })
    .await?;

    tracing::info!(entry_id = %entry.id, "entry stored");
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100) as usize;
    let offset = query.offset.unwrap_or(0).max(0) as usize;

    let (entries, total) = with_db(&state, move |conn| {
        let entries = store::list_entries(conn, limit, offset)?;
        let total = store::count_entries(conn)?;
        Ok((entries, total))
    })
    .await?;

    Ok(Json(json!({
        "entries": entries,
        "total": total,
        "limit": limit,
        "offset": offset,
    })))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Entry>, ApiError> {
    let entry = with_db(&state, move |conn| store::get_entry(conn, &id)).await?;
    match entry {
        Some(entry) => Ok(Json(entry)),
        None => Err(api_error(StatusCode::NOT_FOUND, "entry not found")),
    }
}

// ── Speech synthesis ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TtsRequest {
    text: String,
    voice_id: Option<String>,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

async fn tts_synthesize(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> Result<Response, ApiError> {
    if request.text.trim().is_empty() || request.text.chars().count() > MAX_TTS_CHARS {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("text must be 1 to {MAX_TTS_CHARS} characters"),
        ));
    }
    if tts::sanitize_for_speech(&request.text).is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "text has no speakable content",
        ));
    }
    let voice = request
        .voice_id
        .unwrap_or_else(|| state.config.tts.voice.clone());

    if request.stream {
        // Catch a down engine before committing to a 200 streaming response
        if !state.synthesizer.ready().await {
            tracing::warn!("speech engine not ready; refusing stream request");
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "speech synthesis is temporarily unavailable",
            ));
        }
        let stream = tts::synthesize_streaming(state.synthesizer.clone(), request.text, voice);
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "audio/wav")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .map_err(internal_error)?;
        Ok(response)
    } else {
        match state.synthesizer.synthesize(&request.text, &voice).await {
            Ok(audio) => {
                Ok(([(header::CONTENT_TYPE, "audio/wav")], audio).into_response())
            }
            Err(SynthesisError::EmptyText) => Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "text has no speakable content",
            )),
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis unavailable");
                Err(api_error(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "speech synthesis is temporarily unavailable",
                ))
            }
        }
    }
}

async fn tts_status(State(state): State<AppState>) -> Json<Value> {
    let available = state.synthesizer.ready().await;
    Json(json!({
        "available": available,
        "voice_id": state.config.tts.voice,
    }))
}

// ── Saved conversations ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConversationCreateRequest {
    kind: ConversationKind,
    transcription: String,
    #[serde(default)]
    duration_seconds: i64,
    #[serde(default)]
    message_count: i64,
    #[serde(default)]
    search_queries_used: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationUpdateRequest {
    transcription: Option<String>,
    duration_seconds: Option<i64>,
    message_count: Option<i64>,
    search_queries_used: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ConversationListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    kind: Option<ConversationKind>,
}

async fn save_conversation(
    State(state): State<AppState>,
    Json(request): Json<ConversationCreateRequest>,
) -> Result<(StatusCode, Json<ConversationRecord>), ApiError> {
    if request.transcription.is_empty()
        || request.transcription.chars().count() > MAX_TRANSCRIPTION_CHARS
    {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("transcription must be 1 to {MAX_TRANSCRIPTION_CHARS} characters"),
        ));
    }

    let record = with_db(&state, move |conn| {
        conversations::insert_conversation(
            conn,
            request.kind,
            &request.transcription,
            request.duration_seconds,
            request.message_count,
            &request.search_queries_used,
        )
    })
    .await?;

    tracing::info!(id = %record.id, kind = record.kind.as_str(), "conversation saved");
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_saved_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationListQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = conversations::clamp_list_limit(query.limit);
    let offset = query.offset.unwrap_or(0).max(0) as usize;
    let kind = query.kind;

    let records = with_db(&state, move |conn| {
        conversations::list_conversations(conn, limit, offset, kind)
    })
    .await?;

    Ok(Json(json!({ "conversations": records })))
}

async fn get_saved_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationRecord>, ApiError> {
    let record = with_db(&state, move |conn| conversations::get_conversation(conn, &id)).await?;
    match record {
        Some(record) => Ok(Json(record)),
        None => Err(api_error(StatusCode::NOT_FOUND, "conversation not found")),
    }
}

async fn update_saved_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ConversationUpdateRequest>,
) -> Result<Json<ConversationRecord>, ApiError> {
    let record = with_db(&state, move |conn| {
        conversations::update_conversation(
            conn,
            &id,
            request.transcription.as_deref(),
            request.duration_seconds,
            request.message_count,
            request.search_queries_used.as_deref(),
        )
    })
    .await?;

    match record {
        Some(record) => Ok(Json(record)),
        None => Err(api_error(StatusCode::NOT_FOUND, "conversation not found")),
    }
}

async fn delete_saved_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let target = id.clone();
    let deleted =
        with_db(&state, move |conn| conversations::delete_conversation(conn, &target)).await?;

    if deleted {
        tracing::info!(id = %id, "conversation deleted");
        Ok(Json(json!({ "id": id, "deleted": true })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "conversation not found"))
    }
}

async fn conversation_summary(
    State(state): State<AppState>,
) -> Result<Json<ConversationStats>, ApiError> {
    let stats = with_db(&state, conversations::conversation_stats).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_validation_bounds() {
        assert!(validate_message("how was my week?").is_ok());
        assert!(validate_message("").is_err());
        assert!(validate_message("   ").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn history_rebuild_keeps_known_roles_in_order() {
        let history = vec![
            HistoryMessage {
                role: "user".into(),
                content: "hi".into(),
            },
            HistoryMessage {
                role: "assistant".into(),
                content: "hello!".into(),
            },
            HistoryMessage {
                role: "system".into(),
                content: "should be skipped".into(),
            },
            HistoryMessage {
                role: "user".into(),
                content: "what did I write?".into(),
            },
        ];

        let session = session_from_history(&history);

        assert_eq!(session.message_count(), 3);
        let contents: Vec<&str> = session.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello!", "what did I write?"]);
    }

    #[test]
    fn chat_request_tolerates_missing_history() {
        let request: DiaryChatRequest =
            serde_json::from_str(r#"{"message": "hello"}"#).unwrap();
        assert!(request.conversation_history.is_empty());

        // Extra fields from older clients are ignored, not rejected
        let request: DiaryChatRequest = serde_json::from_str(
            r#"{"message": "hello", "voice_enabled": true, "conversation_id": 7}"#,
        )
        .unwrap();
        assert_eq!(request.message, "hello");
    }

    #[test]
    fn tts_request_defaults_to_streaming() {
        let request: TtsRequest = serde_json::from_str(r#"{"text": "Good evening."}"#).unwrap();
        assert!(request.stream);
        assert!(request.voice_id.is_none());
    }

    #[test]
    fn conversation_kind_query_parses_lowercase() {
        let query: ConversationListQuery =
            serde_json::from_str(r#"{"kind": "call", "limit": 5}"#).unwrap();
        assert_eq!(query.kind, Some(ConversationKind::Call));
    }
}
