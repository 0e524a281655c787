//! Echo's idle-state UI text: greetings shown when a conversation opens and
//! feedback lines shown while a search runs.

use rand::seq::SliceRandom;

/// Greeting variants for conversation start.
pub const GREETINGS: [&str; 10] = [
    "Hi there! I'm Echo, your diary companion. You can type your thoughts or use the voice button to talk with me. What's on your mind today?",
    "Hello! Echo here, ready to help you explore your diary. Feel free to type or speak - I'm listening. How can I assist you?",
    "Hey! I'm Echo, and I'm here to chat about your journal entries. You can write or use voice - whatever feels comfortable. What would you like to discuss?",
    "Hi! It's Echo, your personal diary AI. Type away or hit the mic button to speak with me. What are you curious about from your entries?",
    "Hello there! I'm Echo, ready to dive into your diary with you. Use text or voice - I'm here either way. What's something you'd like to explore?",
    "Hey! Echo at your service, ready to chat about your journal. Type your questions or speak them aloud - I'm all ears. What shall we talk about?",
    "Hi! I'm Echo, your diary conversation partner. Whether you type or talk, I'm here to help. What memories or thoughts would you like to revisit?",
    "Hello! Echo here, excited to explore your diary together. Use the keyboard or microphone - both work great. What's something interesting you'd like to find?",
    "Hey there! I'm Echo, and I love helping you discover insights from your entries. Type or speak your thoughts - I'm ready. What's on your agenda today?",
    "Hi! It's Echo, your journal AI companion. Feel free to type or use voice input - whatever suits you best. What would you like to uncover from your diary?",
];

/// Lines shown while the diary search runs.
pub const SEARCH_FEEDBACK: [&str; 8] = [
    "Checking diary...",
    "Reading your thoughts...",
    "Searching your memories...",
    "Looking through your entries...",
    "Finding relevant moments...",
    "Exploring your past entries...",
    "Scanning your journal...",
    "Reviewing your thoughts...",
];

/// Pick a random greeting for conversation start.
pub fn random_greeting() -> &'static str {
    pick(&GREETINGS)
}

/// Pick a random search-progress line.
pub fn random_search_feedback() -> &'static str {
    pick(&SEARCH_FEEDBACK)
}

fn pick(items: &[&'static str]) -> &'static str {
    let mut rng = rand::thread_rng();
    // Slices here are const non-empty arrays
    items.choose(&mut rng).copied().unwrap_or(items[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_comes_from_the_known_set() {
        for _ in 0..20 {
            let g = random_greeting();
            assert!(GREETINGS.contains(&g));
        }
    }

    #[test]
    fn feedback_comes_from_the_known_set() {
        for _ in 0..20 {
            let f = random_search_feedback();
            assert!(SEARCH_FEEDBACK.contains(&f));
        }
    }

    #[test]
    fn every_greeting_mentions_echo() {
        assert!(GREETINGS.iter().all(|g| g.contains("Echo")));
    }
}
