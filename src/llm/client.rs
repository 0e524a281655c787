//! Ollama chat client with tool-calling support.
//!
//! Speaks the native `/api/chat` endpoint. Tool declarations go out in the
//! OpenAI-compatible `{"type":"function","function":{...}}` shape; replies
//! come back through [`interpret_reply`](crate::llm::parse::interpret_reply),
//! which owns the tolerant parsing of inconsistent tool-call output.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ChatConfig;
use crate::llm::parse::interpret_reply;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("model backend unreachable: {0}")]
    Unavailable(String),
    #[error("model API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("response parsing error: {0}")]
    Parse(String),
}

/// One transcript message on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
        }
    }
}

/// A request from the model to run a declared tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
}

/// What one model round produced: a final answer, or a tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutcome {
    Answer(String),
    ToolCall(ToolInvocation),
}

/// Seam between the orchestrator and the model backend. Lets tests drive the
/// turn loop with scripted outcomes instead of a live server.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn converse(
        &self,
        transcript: &[WireMessage],
        tools: &[Value],
    ) -> Result<ModelOutcome, LlmError>;
}

// ── Ollama wire types ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_ctx: usize,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    arguments: Value,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// HTTP client for a local Ollama server.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    num_ctx: usize,
}

impl OllamaClient {
    pub fn new(config: &ChatConfig) -> Result<Self, LlmError> {
        // Local models can be slow, especially on first load
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            num_ctx: config.context_window,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Unavailable(format!("request to {} timed out", self.base_url))
        } else if e.is_connect() {
            LlmError::Unavailable(format!("cannot connect to Ollama at {}: {e}", self.base_url))
        } else {
            LlmError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn converse(
        &self,
        transcript: &[WireMessage],
        tools: &[Value],
    ) -> Result<ModelOutcome, LlmError> {
        let request = OllamaChatRequest {
            model: &self.model,
            messages: transcript,
            stream: false,
            tools: if tools.is_empty() { None } else { Some(tools) },
            options: OllamaOptions {
                temperature: self.temperature,
                num_ctx: self.num_ctx,
            },
        };

        let response = self
            .client
            .post(self.api_url("/api/chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("invalid chat response: {e}")))?;

        tracing::debug!(
            model = %self.model,
            done_reason = parsed.done_reason.as_deref().unwrap_or("unknown"),
            structured_tool_calls = parsed
                .message
                .tool_calls
                .as_ref()
                .map(|c| c.len())
                .unwrap_or(0),
            "model round complete"
        );

        let structured = parsed.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|c| (c.function.name, c.function.arguments))
                .collect::<Vec<_>>()
        });

        Ok(interpret_reply(
            &parsed.message.content,
            structured,
            &declared_names(tools),
        ))
    }
}

/// Pull the declared function names out of wire-format tool declarations.
pub fn declared_names(tools: &[Value]) -> Vec<String> {
    tools
        .iter()
        .filter_map(|t| t["function"]["name"].as_str().map(|s| s.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_names_extracts_function_names() {
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "search_diary", "description": "x", "parameters": {}}
        })];
        assert_eq!(declared_names(&tools), vec!["search_diary"]);
    }

    #[test]
    fn wire_message_constructors_set_roles() {
        assert_eq!(WireMessage::system("a").role, "system");
        assert_eq!(WireMessage::user("b").role, "user");
        assert_eq!(WireMessage::assistant("c").role, "assistant");
        assert_eq!(WireMessage::tool("d").role, "tool");
    }

    #[test]
    fn request_serializes_without_empty_tools() {
        let messages = vec![WireMessage::user("hello")];
        let request = OllamaChatRequest {
            model: "qwen3:8b",
            messages: &messages,
            stream: false,
            tools: None,
            options: OllamaOptions {
                temperature: 0.2,
                num_ctx: 8192,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["options"]["num_ctx"], 8192);
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
