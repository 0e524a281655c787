//! Speech synthesis client for a local Piper-compatible engine.
//!
//! Answers are spoken as well as shown, so text is sanitized before synthesis:
//! markup emphasis characters and emoji mis-render as spoken artifacts
//! ("asterisk", "hash") and are stripped, then whitespace is collapsed.
//! Streaming synthesis splits the text at sentence boundaries and synthesizes
//! each piece separately so playback can start before the full answer is
//! rendered.
//!
//! Synthesis is always optional: callers treat [`SynthesisError`] as a signal
//! to skip audio and keep the text response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::config::TtsConfig;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),
    #[error("speech engine error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("nothing to synthesize after sanitization")]
    EmptyText,
}

/// A text-to-speech engine. One complete WAV buffer per call; streaming is
/// layered on top by [`synthesize_streaming`].
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize one utterance with the given voice.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError>;

    /// Whether the engine is currently reachable.
    async fn ready(&self) -> bool;
}

// ── Text preparation ──────────────────────────────────────────────────────────

/// Strip markup emphasis characters and emoji, then collapse whitespace.
pub fn sanitize_for_speech(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !is_emphasis_markup(*c) && !is_emoji(*c))
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_emphasis_markup(c: char) -> bool {
    matches!(c, '*' | '_' | '~' | '`' | '#')
}

fn is_emoji(c: char) -> bool {
    matches!(c,
        '\u{1F100}'..='\u{1F1FF}'   // enclosed alphanumerics, regional indicators
        | '\u{1F300}'..='\u{1F5FF}' // symbols and pictographs
        | '\u{1F600}'..='\u{1F64F}' // emoticons
        | '\u{1F680}'..='\u{1F6FF}' // transport
        | '\u{1F900}'..='\u{1F9FF}' // supplemental symbols
        | '\u{1FA70}'..='\u{1FAFF}' // symbols extended-A
        | '\u{2600}'..='\u{26FF}'   // misc symbols
        | '\u{2700}'..='\u{27BF}'   // dingbats
        | '\u{2B00}'..='\u{2BFF}'   // stars and arrows
        | '\u{FE00}'..='\u{FE0F}'   // variation selectors
        | '\u{200D}'                // zero-width joiner
    )
}

/// Split text into speakable chunks: sentence boundaries first, falling back
/// to comma boundaries when one long run of text has no sentence breaks.
pub fn split_for_streaming(text: &str) -> Vec<String> {
    let text = text.trim();
    let sentences = split_after(text, |c| matches!(c, '.' | '!' | '?'));
    if sentences.len() == 1 && text.chars().count() > 100 {
        return split_after(text, |c| c == ',');
    }
    sentences
}

/// Split after break characters that are followed by whitespace, keeping the
/// break character with the preceding chunk.
fn split_after(text: &str, is_break: impl Fn(char) -> bool) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if is_break(c) && chars.peek().is_some_and(|n| n.is_whitespace()) {
            chunks.push(current.trim().to_string());
            current.clear();
        }
    }
    let rest = current.trim();
    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

// ── Streaming ─────────────────────────────────────────────────────────────────

/// Synthesize `text` chunk by chunk, yielding each WAV buffer as it becomes
/// available. Ends early on the first engine failure.
pub fn synthesize_streaming(
    synthesizer: Arc<dyn SpeechSynthesizer>,
    text: String,
    voice: String,
) -> impl Stream<Item = Result<Vec<u8>, SynthesisError>> {
    async_stream::stream! {
        let clean = sanitize_for_speech(&text);
        if clean.is_empty() {
            yield Err(SynthesisError::EmptyText);
            return;
        }
        for sentence in split_for_streaming(&clean) {
            match synthesizer.synthesize(&sentence, &voice).await {
                Ok(chunk) => yield Ok(chunk),
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
    }
}

// ── Piper HTTP client ─────────────────────────────────────────────────────────

/// HTTP client for a local Piper wrapper serving `POST /synthesize` and
/// `GET /status`.
pub struct PiperClient {
    client: reqwest::Client,
    base_url: String,
}

impl PiperClient {
    pub fn new(config: &TtsConfig) -> Result<Self, SynthesisError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SynthesisError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> SynthesisError {
        if e.is_timeout() {
            SynthesisError::Unavailable(format!("request to {} timed out", self.base_url))
        } else if e.is_connect() {
            SynthesisError::Unavailable(format!(
                "cannot connect to speech engine at {}: {e}",
                self.base_url
            ))
        } else {
            SynthesisError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for PiperClient {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError> {
        let clean = sanitize_for_speech(text);
        if clean.is_empty() {
            return Err(SynthesisError::EmptyText);
        }

        let response = self
            .client
            .post(format!("{}/synthesize", self.base_url))
            .json(&serde_json::json!({ "text": clean, "voice": voice }))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let audio = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        tracing::debug!(bytes = audio.len(), voice, "synthesized utterance");
        Ok(audio.to_vec())
    }

    async fn ready(&self) -> bool {
        match self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(_) => false,
        }
    }
}
