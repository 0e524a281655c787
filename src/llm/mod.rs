//! Chat model access.
//!
//! [`client`] speaks the Ollama chat API and hides its wire shapes behind the
//! [`ModelBackend`] trait; [`parse`] turns whatever the model produced into a
//! [`ModelOutcome`], tolerating tool calls leaked into plain text.

pub mod client;
pub mod parse;

pub use client::{
    declared_names, LlmError, ModelBackend, ModelOutcome, OllamaClient, ToolInvocation,
    WireMessage,
};
pub use parse::{interpret_reply, strip_thinking_block};
