//! Echo's prompt text.
//!
//! Two system prompts: the dated one for the opening model round (when tools
//! are declared) and the refocused one used after a tool round, which points
//! the model at the result payloads sitting in the transcript. The answer
//! length convention lives here as prompt text, not as a validated limit.

use chrono::NaiveDate;

/// System prompt for the first model round of a turn.
pub fn system_prompt(today: NaiveDate) -> String {
    format!(
        "You are Echo, a diary companion. Today is {}.\n\n\
         When users ask about their diary entries, use the search_diary tool:\n\
         - content searches like \"hiking\", \"work\", \"friends\"\n\
         - add a date_range when they ask about a period like \"yesterday\" or \"last week\"\n\n\
         Use the tool to find relevant entries. Keep answers warm and conversational, \
         four to five lines at most.",
        today.format("%A, %B %d, %Y")
    )
}

/// System prompt swapped in for answer generation after a tool round.
pub const REFOCUS_PROMPT: &str = "You are Echo. Look for tool results containing diary entry \
     data. Analyze those diary entries and thoughtfully reply as if you are talking to the user \
     naturally using 'you' and 'your'.";

/// Shown when the model produced an empty answer.
pub const EMPTY_FALLBACK: &str = "Hello! I'm Echo, your diary companion. I'm here to help you \
     explore your thoughts and memories. What would you like to talk about today?";

/// The single user-visible apology for turn-level failures. Detail goes to
/// the logs, never to the user.
pub const ERROR_APOLOGY: &str = "I'm sorry, I encountered an error while processing your \
     message. Please try again.";
