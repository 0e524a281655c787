//! The diary chat turn loop.
//!
//! One user turn resolves fully before the next is accepted: the engine calls
//! the model with the session transcript and the `search_diary` declaration;
//! a tool request runs the search, the call and its result are appended to
//! the wire transcript in order, and the model is reinvoked. At most two tool
//! rounds are allowed per turn — after that the declarations are withheld so
//! the model has to answer directly. A repeated identical tool request skips
//! straight to the forced answer instead of re-running the search.
//!
//! Failure policy: only an unreachable model aborts a turn, and the session
//! is not touched until an answer exists, so a failed or abandoned turn
//! leaves the transcript exactly as it was. Tool failures degrade to an
//! empty result payload.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use thiserror::Error;

use crate::chat::prompts;
use crate::chat::session::{ConversationSession, TurnRole};
use crate::llm::{ModelBackend, ModelOutcome, ToolInvocation, WireMessage};
use crate::tools::{search_diary, DiaryTools, ToolReply};

/// Tool rounds allowed within one user turn before the engine forces a
/// direct answer.
const MAX_TOOL_ROUNDS: usize = 2;

/// Turn-level failures surfaced to callers. Tool and synthesis problems never
/// abort a turn; they degrade instead.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Backend unreachable or misbehaving. Recoverable: the session keeps its
    /// pre-turn transcript, so the user can simply retry.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
}

/// What one resolved turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    pub tool_calls_made: Vec<String>,
    pub search_queries_used: Vec<String>,
}

/// Turn orchestrator. Shared across sessions; all per-conversation state
/// lives in the [`ConversationSession`] passed into [`process_turn`].
///
/// [`process_turn`]: ChatEngine::process_turn
pub struct ChatEngine {
    model: Arc<dyn ModelBackend>,
    tools: DiaryTools,
    history_window: usize,
}

impl ChatEngine {
    pub fn new(model: Arc<dyn ModelBackend>, tools: DiaryTools, history_window: usize) -> Self {
        Self {
            model,
            tools,
            history_window,
        }
    }

    /// Resolve one user turn to a final answer.
    ///
    /// The session is only mutated once the answer exists: the user turn and
    /// the assistant turn are appended together at the end, so dropping this
    /// future mid-flight (caller disconnect) cannot leave a partial answer in
    /// the transcript.
    pub async fn process_turn(
        &self,
        session: &mut ConversationSession,
        message: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let received_at = Utc::now();
        let mut transcript = self.base_transcript(session, message);
        let declarations = self.tools.declarations();

        let mut tool_calls_made: Vec<String> = Vec::new();
        let mut search_queries: Vec<String> = Vec::new();
        let mut last_invocation: Option<ToolInvocation> = None;
        let mut answer: Option<String> = None;

        for round in 0..MAX_TOOL_ROUNDS {
            match self.invoke_model(&transcript, &declarations).await? {
                ModelOutcome::Answer(text) => {
                    answer = Some(text);
                    break;
                }
                ModelOutcome::ToolCall(invocation) => {
                    if last_invocation.as_ref() == Some(&invocation) {
                        tracing::info!(
                            tool = %invocation.name,
                            "model repeated the same tool call; forcing a direct answer"
                        );
                        break;
                    }

                    let reply = self.run_tool(&invocation).await;
                    tool_calls_made.push(invocation.name.clone());
                    if let Some(query) = &reply.search_query {
                        if !search_queries.contains(query) {
                            search_queries.push(query.clone());
                        }
                    }

                    // Result turn goes immediately after the call that caused it
                    transcript.push(WireMessage::assistant(tool_call_as_text(&invocation)));
                    transcript.push(WireMessage::tool(reply.payload.as_str()));
                    transcript[0] = WireMessage::system(prompts::REFOCUS_PROMPT);

                    tracing::debug!(round, tool = %invocation.name, "tool round complete");
                    last_invocation = Some(invocation);
                }
            }
        }

        let answer = match answer {
            Some(text) => text,
            // Tool budget exhausted: withhold the declarations so the model
            // has no way to ask for another round
            None => match self.invoke_model(&transcript, &[]).await? {
                ModelOutcome::Answer(text) => text,
                ModelOutcome::ToolCall(_) => String::new(),
            },
        };

        let answer = if answer.trim().is_empty() {
            tracing::warn!("model produced an empty answer; using fallback");
            prompts::EMPTY_FALLBACK.to_string()
        } else {
            answer
        };

        // The turn fully resolved — only now does the session change
        session.push_user_at(message, received_at);
        session.push_assistant(&answer);
        session.record_search_queries(search_queries.iter().map(String::as_str));

        tracing::info!(
            session = session.id(),
            tool_rounds = tool_calls_made.len(),
            "turn resolved"
        );

        Ok(TurnOutcome {
            response: answer,
            tool_calls_made,
            search_queries_used: search_queries,
        })
    }

    async fn invoke_model(
        &self,
        transcript: &[WireMessage],
        tools: &[Value],
    ) -> Result<ModelOutcome, ChatError> {
        self.model.converse(transcript, tools).await.map_err(|e| {
            tracing::error!(error = %e, "model round failed");
            ChatError::ModelUnavailable(e.to_string())
        })
    }

    async fn run_tool(&self, invocation: &ToolInvocation) -> ToolReply {
        match self.tools.execute(invocation).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    tool = %invocation.name,
                    error = %e,
                    "tool failed; continuing with empty results"
                );
                ToolReply {
                    payload: search_diary::failure_payload(),
                    search_query: None,
                }
            }
        }
    }

    /// System prompt, then the most recent session turns up to the history
    /// window, then the new user message.
    fn base_transcript(&self, session: &ConversationSession, message: &str) -> Vec<WireMessage> {
        let today = chrono::Local::now().date_naive();
        let mut transcript = vec![WireMessage::system(prompts::system_prompt(today))];

        let turns = session.turns();
        let start = turns.len().saturating_sub(self.history_window);
        for turn in &turns[start..] {
            transcript.push(match turn.role {
                TurnRole::User => WireMessage::user(turn.content.as_str()),
                TurnRole::Assistant => WireMessage::assistant(turn.content.as_str()),
            });
        }

        transcript.push(WireMessage::user(message));
        transcript
    }
}

/// Canonical text rendering of a tool call for the transcript — the same
/// array-of-calls shape the model itself emits.
fn tool_call_as_text(invocation: &ToolInvocation) -> String {
    json!([{ "name": invocation.name, "arguments": invocation.arguments }]).to_string()
}
