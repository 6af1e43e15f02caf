use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, TriageError};
use crate::models::{Analysis, Category, MAX_PRIORITY, MIN_PRIORITY};

pub mod gemini;
pub mod rate_limit;
pub mod scripted;

pub use gemini::GeminiClassifier;
pub use rate_limit::RateLimiter;
pub use scripted::ScriptedClassifier;

/// Bodies are cut to this many characters before they are sent out.
pub const MAX_BODY_CHARS: usize = 4000;
/// Unusable replies are logged cut to this many characters.
const LOGGED_REPLY_CHARS: usize = 200;

/// What the backend is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// A JSON object with `category`, `priority` and `summary`.
    Analysis,
    /// Unstructured text.
    FreeText,
}

/// The external content-analysis service. Implementations only move text;
/// every caller parses and validates what comes back.
#[async_trait(?Send)]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, text: &str, instructions: &str, shape: ResponseShape)
        -> Result<String>;
}

pub fn render_prompt(instructions: &str, text: &str) -> String {
    format!("{instructions}\nHere is the email body:\n---\n{text}\n")
}

pub fn analysis_instructions() -> String {
    let labels = Category::ALL
        .iter()
        .map(|c| format!("'{}'", c.label()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Analyze the following email content.\n\
         Respond in a strict JSON format. Do not include any other text or formatting like ```json.\n\
         The JSON object must have exactly three keys:\n\
         1. 'category': Choose one of the following strings: {labels}.\n\
         2. 'priority': An integer from {MIN_PRIORITY} (lowest, can be ignored) to {MAX_PRIORITY} (highest, needs immediate attention).\n\
         3. 'summary': A concise, one-sentence summary of the email's main point or call to action."
    )
}

pub const UNSUBSCRIBE_INSTRUCTIONS: &str = "Analyze the following email content. Your only job is to find the unsubscribe URL.\n\
     Look for phrases like 'unsubscribe', 'manage your preferences', or 'opt-out'.\n\
     Return ONLY the full URL. If you cannot find a URL, return the single word 'None'.";

/// Rate-limited front for a [`Classifier`] backend.
pub struct ClassifierClient {
    backend: Box<dyn Classifier>,
    limiter: RateLimiter,
}

impl ClassifierClient {
    pub fn new(backend: Box<dyn Classifier>, limiter: RateLimiter) -> Self {
        Self { backend, limiter }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Score one email body. Any transport, parse or validation failure is
    /// returned as an error; the raw reply is logged when it cannot be used.
    pub async fn analyze(&self, body: &str) -> Result<Analysis> {
        let text = truncate_chars(body, MAX_BODY_CHARS);
        self.limiter.acquire().await;
        let raw = self
            .backend
            .classify(text, &analysis_instructions(), ResponseShape::Analysis)
            .await?;

        parse_analysis(&raw).inspect_err(|error| {
            warn!(
                "unusable analysis from {}: {error}; raw reply: {}",
                self.backend.name(),
                reply_preview(&raw)
            );
        })
    }

    /// Ask the backend to locate an opt-out link in `body`. Only replies that
    /// start with `http` count as a link.
    pub async fn find_unsubscribe_url(&self, body: &str) -> Result<Option<String>> {
        let text = truncate_chars(body, MAX_BODY_CHARS);
        self.limiter.acquire().await;
        let raw = self
            .backend
            .classify(text, UNSUBSCRIBE_INSTRUCTIONS, ResponseShape::FreeText)
            .await?;

        let link = raw.trim();
        if link.get(..4).is_some_and(|prefix| prefix.eq_ignore_ascii_case("http")) {
            Ok(Some(link.to_string()))
        } else {
            Ok(None)
        }
    }
}

/// Fixed-length cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Drop a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisReply {
    category: Category,
    priority: i64,
    summary: String,
}

pub fn parse_analysis(raw: &str) -> Result<Analysis> {
    let payload = strip_code_fences(raw);
    if payload.is_empty() {
        return Err(TriageError::Parse("empty classifier response".to_string()));
    }

    let reply: AnalysisReply = serde_json::from_str(payload)
        .map_err(|e| TriageError::Parse(format!("decode analysis JSON: {e}")))?;

    let priority = u8::try_from(reply.priority)
        .ok()
        .filter(|p| (MIN_PRIORITY..=MAX_PRIORITY).contains(p))
        .ok_or_else(|| {
            TriageError::Validation(format!(
                "priority {} outside {MIN_PRIORITY}..={MAX_PRIORITY}",
                reply.priority
            ))
        })?;

    Ok(Analysis {
        category: reply.category,
        priority,
        summary: reply.summary.trim().to_string(),
    })
}

/// Single-line, length-capped view of a raw reply for logs.
fn reply_preview(raw: &str) -> String {
    let flat = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = truncate_chars(&flat, LOGGED_REPLY_CHARS);
    if cut.len() < flat.len() {
        format!("{cut}…[truncated {} bytes]", flat.len())
    } else {
        flat
    }
}
