//! Personal journal with a conversational diary companion.
//!
//! Echo Journal stores diary entries with precomputed embeddings and lets the
//! user talk to their diary: a local LLM answers questions about past entries
//! by calling a semantic search tool over the stored vectors, and a local
//! speech engine can read the answers aloud. Everything runs on-device; no
//! entry text leaves the machine.
//!
//! # Architecture
//!
//! - **Storage**: SQLite; entry embeddings stored inline as f32 BLOBs
//! - **Embeddings**: Local ONNX Runtime with bge-small-en-v1.5 (384 dimensions)
//! - **Chat**: Ollama chat API with one declared tool (`search_diary`) and a
//!   tolerant parser for tool calls the model emits as plain text
//! - **Speech**: HTTP client for a local Piper wrapper, with sentence-level
//!   streaming
//! - **API**: axum HTTP server for the journaling frontend
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`db`] — SQLite database initialization, schema, migrations, and health checks
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`diary`] — Entry storage and the read-only similarity search accessor
//! - [`llm`] — Ollama chat client and model output interpretation
//! - [`tools`] — Tool declarations and execution for the chat model
//! - [`chat`] — Conversation sessions and the turn orchestrator
//! - [`tts`] — Text sanitization and the speech synthesis client
//! - [`conversations`] — Saved conversation records and statistics
//! - [`server`] — HTTP API surface

pub mod chat;
pub mod config;
pub mod conversations;
pub mod db;
pub mod diary;
pub mod embedding;
pub mod llm;
pub mod server;
pub mod tools;
pub mod tts;
