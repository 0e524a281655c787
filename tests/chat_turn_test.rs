mod helpers;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use echo_journal::chat::{ChatEngine, ChatError, ConversationSession};
use echo_journal::config::EchoConfig;
use echo_journal::conversations::{self, ConversationKind};
use echo_journal::embedding::EmbeddingProvider;
use echo_journal::llm::{LlmError, ModelBackend, ModelOutcome, ToolInvocation, WireMessage};
use echo_journal::tools::DiaryTools;
use helpers::{seed_entry, test_db, test_embedding};

/// Feeds pre-scripted model outcomes to the engine in order.
struct ScriptedModel {
    script: Mutex<VecDeque<Result<ModelOutcome, LlmError>>>,
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    async fn converse(
        &self,
        _transcript: &[WireMessage],
        _tools: &[Value],
    ) -> Result<ModelOutcome, LlmError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ModelOutcome::Answer("out of script".into())))
    }
}

/// Embeds every text to the same spike vector, so seeded entries with that
/// vector always match.
struct FixedProvider;

impl EmbeddingProvider for FixedProvider {
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(test_embedding(0))
    }
}

fn engine_over(
    db: Arc<Mutex<rusqlite::Connection>>,
    script: Vec<Result<ModelOutcome, LlmError>>,
) -> ChatEngine {
    let tools = DiaryTools::new(db, Arc::new(FixedProvider), Arc::new(EchoConfig::default()));
    let model = Arc::new(ScriptedModel {
        script: Mutex::new(script.into()),
    });
    ChatEngine::new(model, tools, 10)
}

fn search_call(query: &str) -> Result<ModelOutcome, LlmError> {
    Ok(ModelOutcome::ToolCall(ToolInvocation {
        name: "search_diary".to_string(),
        arguments: json!({ "query": query }),
    }))
}

fn answer(text: &str) -> Result<ModelOutcome, LlmError> {
    Ok(ModelOutcome::Answer(text.to_string()))
}

#[tokio::test]
async fn search_backed_answer_flows_from_store_to_response() {
    let conn = test_db();
    seed_entry(
        &conn,
        "Deadline pressure all week, slept badly",
        &["anxious"],
        &test_embedding(0),
        "2026-08-18T21:00:00+00:00",
    );
    seed_entry(
        &conn,
        "Standup was tense, hands were shaky",
        &["anxious"],
        &test_embedding(0),
        "2026-08-20T21:00:00+00:00",
    );

    let db = Arc::new(Mutex::new(conn));
    let engine = engine_over(
        Arc::clone(&db),
        vec![
            search_call("work stress"),
            answer("You wrote about deadline pressure and a tense standup last week."),
        ],
    );
    let mut session = ConversationSession::new();

    let outcome = engine
        .process_turn(&mut session, "What did I say about work stress lately?")
        .await
        .unwrap();

    assert!(outcome.response.contains("deadline pressure"));
    assert_eq!(outcome.tool_calls_made, vec!["search_diary"]);
    assert_eq!(outcome.search_queries_used, vec!["work stress"]);

    // The turn landed in the session as one user + one assistant message
    assert_eq!(session.message_count(), 2);
    assert_eq!(session.search_queries_used(), &["work stress"]);
}

#[tokio::test]
async fn model_outage_is_recoverable_within_a_session() {
    let conn = test_db();
    let db = Arc::new(Mutex::new(conn));
    let engine = engine_over(
        Arc::clone(&db),
        vec![
            answer("All good so far."),
            Err(LlmError::Unavailable("connection refused".into())),
            answer("Back again, sorry about that."),
        ],
    );
    let mut session = ConversationSession::new();

    engine.process_turn(&mut session, "first question").await.unwrap();
    assert_eq!(session.message_count(), 2);

    // The failed turn leaves no trace in the transcript
    let failed = engine.process_turn(&mut session, "second question").await;
    assert!(matches!(failed, Err(ChatError::ModelUnavailable(_))));
    assert_eq!(session.message_count(), 2);

    // A plain retry of the same message succeeds
    let retried = engine
        .process_turn(&mut session, "second question")
        .await
        .unwrap();
    assert_eq!(retried.response, "Back again, sorry about that.");
    assert_eq!(session.message_count(), 4);
}

#[tokio::test]
async fn forced_answer_after_two_search_rounds_reaches_the_user() {
    let conn = test_db();
    seed_entry(
        &conn,
        "Planted tomatoes in the garden",
        &[],
        &test_embedding(0),
        "2026-05-02T10:00:00+00:00",
    );

    let db = Arc::new(Mutex::new(conn));
    let engine = engine_over(
        Arc::clone(&db),
        vec![
            search_call("garden"),
            search_call("tomatoes"),
            // Third round has no tool declarations, so only an answer can follow
            answer("You planted tomatoes in early May."),
        ],
    );
    let mut session = ConversationSession::new();

    let outcome = engine
        .process_turn(&mut session, "what did I plant?")
        .await
        .unwrap();

    assert_eq!(outcome.response, "You planted tomatoes in early May.");
    assert_eq!(outcome.tool_calls_made.len(), 2);
    assert_eq!(outcome.search_queries_used, vec!["garden", "tomatoes"]);
}

#[tokio::test]
async fn saved_conversation_captures_session_summary() {
    let conn = test_db();
    seed_entry(
        &conn,
        "Long swim at the lake",
        &[],
        &test_embedding(0),
        "2026-07-04T10:00:00+00:00",
    );

    let db = Arc::new(Mutex::new(conn));
    let engine = engine_over(
        Arc::clone(&db),
        vec![
            search_call("swimming"),
            answer("You swam at the lake on the fourth."),
            answer("Glad it was a good day."),
        ],
    );
    let mut session = ConversationSession::new();

    engine
        .process_turn(&mut session, "when did I last swim?")
        .await
        .unwrap();
    engine
        .process_turn(&mut session, "it was a good day")
        .await
        .unwrap();

    // The user chose to keep the conversation
    let conn = db.lock().unwrap();
    let saved = conversations::insert_conversation(
        &conn,
        ConversationKind::Chat,
        &session.transcription(),
        session.duration_seconds(),
        session.message_count() as i64,
        session.search_queries_used(),
    )
    .unwrap();

    let fetched = conversations::get_conversation(&conn, &saved.id)
        .unwrap()
        .unwrap();
    assert_eq!(fetched.message_count, 4);
    assert_eq!(fetched.search_queries_used, vec!["swimming"]);
    assert!(fetched.transcription.contains("You: when did I last swim?"));
    assert!(fetched.transcription.contains("Echo: You swam at the lake"));

    let stats = conversations::conversation_stats(&conn).unwrap();
    assert_eq!(stats.total_conversations, 1);
    assert_eq!(stats.total_messages, 4);
}

#[tokio::test]
async fn abandoned_sessions_leave_no_rows() {
    let conn = test_db();
    let db = Arc::new(Mutex::new(conn));
    let engine = engine_over(Arc::clone(&db), vec![answer("Noted.")]);

    {
        let mut session = ConversationSession::new();
        engine
            .process_turn(&mut session, "just thinking out loud")
            .await
            .unwrap();
        // Session dropped without a save
    }

    let conn = db.lock().unwrap();
    let stats = conversations::conversation_stats(&conn).unwrap();
    assert_eq!(stats.total_conversations, 0);
}
