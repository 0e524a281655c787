//! Tolerant interpretation of model replies.
//!
//! Local models emit tool calls in two shapes: the structured
//! `message.tool_calls` array, or — unreliably — a plain-text fragment like
//! `[{"name": "search_diary", "arguments": {...}}]` inside the content.
//! [`interpret_reply`] tries the structured form first, then exactly one
//! balanced-bracket extraction from the raw text, and otherwise treats the
//! content as a literal answer so nothing the model said is dropped.
//!
//! The fallback is deliberately a single narrow pass. It stays that way;
//! stacking further heuristics on top is how this class of parser becomes
//! untestable.

use serde_json::Value;

use crate::llm::client::{ModelOutcome, ToolInvocation};

/// Interpret one model round into an answer or a tool invocation.
///
/// `structured` carries `message.tool_calls` entries as `(name, arguments)`
/// pairs when the backend returned them. `declared` is the set of tool names
/// offered on the request; calls to anything else are ignored.
pub fn interpret_reply(
    content: &str,
    structured: Option<Vec<(String, Value)>>,
    declared: &[String],
) -> ModelOutcome {
    // 1. Structured tool_calls win when present
    if let Some(calls) = structured {
        for (name, arguments) in calls {
            if !declared.iter().any(|d| d == &name) {
                tracing::warn!(tool = %name, "dropping structured call to undeclared tool");
                continue;
            }
            match coerce_arguments(arguments) {
                Some(arguments) => {
                    return ModelOutcome::ToolCall(ToolInvocation { name, arguments });
                }
                None => {
                    tracing::warn!(tool = %name, "structured call had undecodable arguments");
                }
            }
        }
    }

    let text = strip_thinking_block(content);

    // 2. One balanced-bracket extraction from the raw text
    if let Some(fragment) = extract_json_fragment(text) {
        if let Ok(value) = serde_json::from_str::<Value>(fragment) {
            if let Some(invocation) = coerce_tool_invocation(value, declared) {
                tracing::info!(tool = %invocation.name, "recovered tool call from plain text");
                return ModelOutcome::ToolCall(invocation);
            }
        }
    }

    // 3. Literal answer — never silently drop content
    ModelOutcome::Answer(text.to_string())
}

/// Drop a `<think>...</think>` reasoning prelude, returning what follows the
/// closing tag. Text without a closing tag passes through untouched.
pub fn strip_thinking_block(text: &str) -> &str {
    match text.find("</think>") {
        Some(idx) => text[idx + "</think>".len()..].trim(),
        None => text,
    }
}

/// Find the first balanced JSON array or object in `text`.
///
/// Scans from the first `[` or `{`, tracking bracket depth and skipping
/// string literals (including escapes). Returns the candidate slice; the
/// caller still has to JSON-parse it. Exactly one candidate is considered.
fn extract_json_fragment(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Accept a parsed fragment as a tool invocation if it is `{"name", "arguments"}`
/// (or an array whose first element is) naming a declared tool.
fn coerce_tool_invocation(value: Value, declared: &[String]) -> Option<ToolInvocation> {
    let candidate = match value {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };

    let Value::Object(mut map) = candidate else {
        return None;
    };

    let name = map.get("name").and_then(Value::as_str)?.to_string();
    if !declared.iter().any(|d| d == &name) {
        return None;
    }

    let arguments = match map.remove("arguments") {
        Some(args) => coerce_arguments(args)?,
        None => Value::Object(Default::default()),
    };

    Some(ToolInvocation { name, arguments })
}

/// Normalize tool arguments to a JSON object. OpenAI-compatible backends
/// send them as a JSON-encoded string; Ollama sends a plain object.
fn coerce_arguments(args: Value) -> Option<Value> {
    match args {
        Value::Object(_) => Some(args),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ Value::Object(_)) => Some(parsed),
            _ => None,
        },
        Value::Null => Some(Value::Object(Default::default())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared() -> Vec<String> {
        vec!["search_diary".to_string()]
    }

    fn expect_tool_call(outcome: ModelOutcome) -> ToolInvocation {
        match outcome {
            ModelOutcome::ToolCall(invocation) => invocation,
            ModelOutcome::Answer(text) => panic!("expected tool call, got answer: {text}"),
        }
    }

    #[test]
    fn tool_call_emitted_as_plain_text_is_recovered() {
        // The exact failure shape seen in production logs
        let content = r#"[{"name":"search_diary","arguments":{"query":"hiking"}}]"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.name, "search_diary");
        assert_eq!(invocation.arguments["query"], "hiking");
    }

    #[test]
    fn tool_call_embedded_in_prose_is_recovered() {
        let content = r#"Let me look that up. [{"name":"search_diary","arguments":{"query":"rainy days"}}] One moment."#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.name, "search_diary");
        assert_eq!(invocation.arguments["query"], "rainy days");
    }

    #[test]
    fn bare_object_form_is_recovered() {
        let content = r#"{"name": "search_diary", "arguments": {"query": "work stress", "limit": 5}}"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.arguments["limit"], 5);
    }

    #[test]
    fn string_encoded_arguments_are_reparsed() {
        let content = r#"{"name": "search_diary", "arguments": "{\"query\": \"holidays\"}"}"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.arguments["query"], "holidays");
    }

    #[test]
    fn structured_tool_calls_take_priority_over_text() {
        let structured = vec![("search_diary".to_string(), json!({"query": "friends"}))];
        let content = r#"[{"name":"search_diary","arguments":{"query":"ignored"}}]"#;

        let invocation =
            expect_tool_call(interpret_reply(content, Some(structured), &declared()));

        assert_eq!(invocation.arguments["query"], "friends");
    }

    #[test]
    fn structured_string_arguments_are_reparsed() {
        let structured = vec![(
            "search_diary".to_string(),
            json!("{\"query\": \"garden\", \"limit\": 3}"),
        )];

        let invocation = expect_tool_call(interpret_reply("", Some(structured), &declared()));

        assert_eq!(invocation.arguments["query"], "garden");
        assert_eq!(invocation.arguments["limit"], 3);
    }

    #[test]
    fn structured_call_to_undeclared_tool_is_skipped() {
        let structured = vec![
            ("delete_everything".to_string(), json!({})),
            ("search_diary".to_string(), json!({"query": "second wins"})),
        ];

        let invocation = expect_tool_call(interpret_reply("", Some(structured), &declared()));

        assert_eq!(invocation.name, "search_diary");
    }

    #[test]
    fn undeclared_tool_in_text_stays_a_literal_answer() {
        let content = r#"[{"name":"get_entries_by_date","arguments":{"date_filter":"yesterday"}}]"#;

        let outcome = interpret_reply(content, None, &declared());

        assert_eq!(outcome, ModelOutcome::Answer(content.to_string()));
    }

    #[test]
    fn plain_prose_is_an_answer() {
        let content = "You wrote about the trail twice last month — both times you sounded glad you went.";

        let outcome = interpret_reply(content, None, &declared());

        assert_eq!(outcome, ModelOutcome::Answer(content.to_string()));
    }

    #[test]
    fn json_that_is_not_a_tool_call_stays_an_answer() {
        let content = "Here are your top moods: [\"calm\", \"hopeful\", \"tired\"]";

        let outcome = interpret_reply(content, None, &declared());

        assert_eq!(outcome, ModelOutcome::Answer(content.to_string()));
    }

    #[test]
    fn unbalanced_fragment_stays_an_answer() {
        let content = r#"I tried to call [{"name": "search_diary", "arguments": {"query": "#;

        let outcome = interpret_reply(content, None, &declared());

        assert_eq!(outcome, ModelOutcome::Answer(content.to_string()));
    }

    #[test]
    fn brackets_inside_string_literals_do_not_confuse_the_scan() {
        let content = r#"[{"name":"search_diary","arguments":{"query":"that ]} weird [ note"}}]"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.arguments["query"], "that ]} weird [ note");
    }

    #[test]
    fn thinking_block_is_stripped_from_answers() {
        let content = "<think>The user wants a summary, no search needed.</think>\nYou sounded upbeat all week.";

        let outcome = interpret_reply(content, None, &declared());

        assert_eq!(
            outcome,
            ModelOutcome::Answer("You sounded upbeat all week.".to_string())
        );
    }

    #[test]
    fn tool_call_after_thinking_block_is_recovered() {
        let content = r#"<think>Need diary context first.</think>[{"name":"search_diary","arguments":{"query":"vacation"}}]"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.arguments["query"], "vacation");
    }

    #[test]
    fn missing_arguments_default_to_empty_object() {
        let content = r#"{"name": "search_diary"}"#;

        let invocation = expect_tool_call(interpret_reply(content, None, &declared()));

        assert_eq!(invocation.arguments, json!({}));
    }

    #[test]
    fn empty_content_is_an_empty_answer() {
        let outcome = interpret_reply("", None, &declared());
        assert_eq!(outcome, ModelOutcome::Answer(String::new()));
    }

    #[test]
    fn strip_thinking_block_without_tag_is_untouched() {
        assert_eq!(strip_thinking_block("no tags here"), "no tags here");
    }

    #[test]
    fn strip_thinking_block_trims_after_tag() {
        assert_eq!(
            strip_thinking_block("<think>hmm</think>   the answer  "),
            "the answer"
        );
    }

    #[test]
    fn extract_finds_first_balanced_fragment_only() {
        let text = r#"prefix {"a": 1} suffix {"b": 2}"#;
        assert_eq!(extract_json_fragment(text), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extract_handles_escaped_quotes() {
        let text = r#"{"note": "she said \"wait\" twice"}"#;
        assert_eq!(extract_json_fragment(text), Some(text));
    }

    #[test]
    fn extract_returns_none_without_brackets() {
        assert_eq!(extract_json_fragment("just words"), None);
    }
}
