//! Diary chat: session state, prompts, and the turn orchestrator.
//!
//! The [`engine`] drives one user turn at a time against the model backend,
//! [`session`] holds the per-conversation transcript, [`prompts`] carries the
//! persona text, and [`greetings`] supplies the canned opener and
//! search-progress lines.

pub mod engine;
pub mod greetings;
pub mod prompts;
pub mod session;

pub use engine::{ChatEngine, ChatError, TurnOutcome};
pub use session::{ConversationSession, ConversationTurn, TurnRole};
