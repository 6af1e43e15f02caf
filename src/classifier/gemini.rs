use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::classifier::{render_prompt, Classifier, ResponseShape};
use crate::error::{Result, TriageError};
use crate::models::Category;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REDACTED_BODY_MAX_LEN: usize = 200;

/// [`Classifier`] backed by the Gemini `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClassifier {
    client: Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClassifier {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TriageError::Transport(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            api_base: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

/// Request body for one prompt. Structured replies carry a response schema
/// so the service itself enforces the three fields and the category set.
fn request_body(prompt: &str, shape: ResponseShape) -> Value {
    let generation_config = match shape {
        ResponseShape::Analysis => json!({
            "temperature": 0.2,
            "responseMimeType": "application/json",
            "responseSchema": analysis_schema(),
        }),
        ResponseShape::FreeText => json!({ "temperature": 0.0 }),
    };

    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": generation_config,
    })
}

fn analysis_schema() -> Value {
    let labels: Vec<&str> = Category::ALL.iter().map(|c| c.label()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "category": { "type": "STRING", "enum": labels },
            "priority": { "type": "INTEGER" },
            "summary": { "type": "STRING" },
        },
        "required": ["category", "priority", "summary"],
    })
}

fn reply_text(response: GenerateContentResponse) -> Result<String> {
    let text = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .unwrap_or_default()
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(TriageError::Parse("gemini returned no text".to_string()));
    }
    Ok(text)
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(REDACTED_BODY_MAX_LEN) {
        Some((cut, _)) => format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len()),
        None => trimmed.to_string(),
    }
}

#[async_trait(?Send)]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn classify(
        &self,
        text: &str,
        instructions: &str,
        shape: ResponseShape,
    ) -> Result<String> {
        let prompt = render_prompt(instructions, text);
        let endpoint = self.endpoint();

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(&prompt, shape))
            .send()
            .await
            .map_err(|e| TriageError::Transport(format!("gemini request {endpoint}: {e}")))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TriageError::Transport(format!(
                "gemini request failed: status={} body={}",
                status,
                redact_response_body(&body)
            )));
        }

        let decoded: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| TriageError::Parse(format!("decode gemini response: {e}")))?;
        reply_text(decoded)
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}
