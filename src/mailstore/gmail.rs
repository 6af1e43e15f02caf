use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{Result, TriageError};
use crate::mailstore::{BatchFetch, MailStore, MessageFormat, ProviderMessage};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const GMAIL_BATCH_ENDPOINT: &str = "https://www.googleapis.com/batch/gmail/v1";
/// Gmail rejects batch requests with more than 100 sub-requests.
pub const MAX_BATCH_SIZE: usize = 100;
const MAX_LIST_PAGE_SIZE: usize = 500;
const MAX_RATE_LIMIT_RETRIES: usize = 5;
/// Extra rounds for ids a batch response throttled or left out.
const MAX_BATCH_RETRIES: usize = 3;
const REDACTED_BODY_MAX_LEN: usize = 200;

/// `MailStore` backed by the Gmail REST API.
///
/// Holds an already-issued access token; obtaining and refreshing it is
/// somebody else's job.
#[derive(Debug, Clone)]
pub struct GmailMailStore {
    client: Client,
    access_token: String,
    api_base: String,
    batch_endpoint: String,
}

impl GmailMailStore {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            api_base: GMAIL_API_BASE.to_string(),
            batch_endpoint: GMAIL_BATCH_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoints(
        mut self,
        api_base: impl Into<String>,
        batch_endpoint: impl Into<String>,
    ) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self.batch_endpoint = batch_endpoint.into();
        self
    }

    async fn send_with_retry(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<String> {
        let mut backoff_seconds = 1u64;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let mut request = self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.access_token)
                .header("accept", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| TriageError::Transport(format!("gmail api request {url}: {e}")))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    let body = response.text().await?;
                    return Err(TriageError::Transport(format!(
                        "gmail api request exhausted retries: {}",
                        redact_response_body(&body)
                    )));
                }

                let wait = retry_after_seconds(response.headers()).unwrap_or(backoff_seconds);
                debug!("gmail throttled on {url}, retrying in {wait}s");
                sleep(Duration::from_secs(wait)).await;
                backoff_seconds = (backoff_seconds * 2).min(32);
                continue;
            }

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(TriageError::Transport(format!(
                    "gmail api request failed: status={} body={}",
                    status,
                    redact_response_body(&body)
                )));
            }

            return Ok(body);
        }

        Err(TriageError::Transport(
            "gmail api request failed without response".to_string(),
        ))
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.api_base)
    }

    async fn batch_get_chunk(&self, ids: &[String], format: MessageFormat) -> BatchRound {
        let boundary = format!("inboxiq_batch_{}", uuid::Uuid::new_v4().as_simple());
        let body = build_batch_body(&boundary, ids, format);
        let content_type = format!("multipart/mixed; boundary={boundary}");
        let mut backoff_seconds = 1u64;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = match self
                .client
                .post(&self.batch_endpoint)
                .bearer_auth(&self.access_token)
                .header("content-type", &content_type)
                .body(body.clone())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => return failed_batch(ids, &format!("batch request error: {e}")),
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS
                && attempt < MAX_RATE_LIMIT_RETRIES
            {
                let wait = retry_after_seconds(response.headers()).unwrap_or(backoff_seconds);
                sleep(Duration::from_secs(wait)).await;
                backoff_seconds = (backoff_seconds * 2).min(32);
                continue;
            }

            let status = response.status();
            let response_content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            let response_body = match response.text().await {
                Ok(body) => body,
                Err(e) => return failed_batch(ids, &format!("batch response read error: {e}")),
            };

            if !status.is_success() {
                return failed_batch(
                    ids,
                    &format!(
                        "batch request failed: status={} body={}",
                        status,
                        redact_response_body(&response_body)
                    ),
                );
            }

            return parse_batch_response(&response_body, &response_content_type, ids);
        }

        failed_batch(ids, "batch request exhausted retries")
    }
}

#[async_trait(?Send)]
impl MailStore for GmailMailStore {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        while ids.len() < max_results {
            let page_size = (max_results - ids.len()).min(MAX_LIST_PAGE_SIZE).to_string();
            let mut params = vec![("q", query), ("maxResults", page_size.as_str())];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = Url::parse_with_params(&self.messages_url(), &params)
                .map_err(|e| TriageError::Transport(format!("build gmail list url: {e}")))?;

            let body = self.send_with_retry(Method::GET, url.as_str(), None).await?;
            let page: MessageList = serde_json::from_str(&body)
                .map_err(|e| TriageError::Parse(format!("decode gmail message list: {e}")))?;

            ids.extend(page.messages.unwrap_or_default().into_iter().map(|stub| stub.id));
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        ids.truncate(max_results);
        Ok(ids)
    }

    async fn get(&self, id: &str, format: MessageFormat) -> Result<ProviderMessage> {
        let url = format!("{}/{id}?format={}", self.messages_url(), format.as_str());
        let body = self.send_with_retry(Method::GET, &url, None).await?;
        serde_json::from_str(&body)
            .map_err(|e| TriageError::Parse(format!("decode gmail message {id}: {e}")))
    }

    async fn batch_get(&self, ids: &[String], format: MessageFormat) -> Result<BatchFetch> {
        let fetched = fetch_with_retries(ids, |chunk: Vec<String>| async move {
            self.batch_get_chunk(&chunk, format).await
        })
        .await;
        Ok(fetched)
    }

    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<()> {
        let url = format!("{}/{id}/modify", self.messages_url());
        let body = json!({ "removeLabelIds": remove_labels });
        self.send_with_retry(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }

    async fn trash(&self, id: &str) -> Result<()> {
        let url = format!("{}/{id}/trash", self.messages_url());
        self.send_with_retry(Method::POST, &url, Some(&json!({})))
            .await?;
        Ok(())
    }
}

/// Extract the access token from an authorized-user JSON file. Accepts the
/// `token` field written by Google's client libraries and the raw
/// `access_token` field of an OAuth token response.
pub fn parse_token_file(raw: &str) -> Result<String> {
    let file: TokenFile = serde_json::from_str(raw)
        .map_err(|e| TriageError::Parse(format!("decode token file: {e}")))?;
    file.token
        .or(file.access_token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TriageError::Validation("token file has no access token".to_string()))
}

fn retry_after_seconds(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn redact_response_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= REDACTED_BODY_MAX_LEN {
        return trimmed.to_string();
    }
    let mut cut = REDACTED_BODY_MAX_LEN;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…[truncated {} bytes]", &trimmed[..cut], trimmed.len())
}

fn build_batch_body(boundary: &str, ids: &[String], format: MessageFormat) -> String {
    let mut body = String::new();
    for id in ids {
        body.push_str(&format!("--{boundary}\r\n"));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <{id}>\r\n"));
        body.push_str("\r\n");
        body.push_str(&format!(
            "GET /gmail/v1/users/me/messages/{id}?format={}\r\n",
            format.as_str()
        ));
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    body
}

/// Outcome of one batch request: parsed messages, permanent failures, and
/// ids to ask for again (throttled, or absent from the response).
#[derive(Debug, Default)]
struct BatchRound {
    messages: Vec<ProviderMessage>,
    errors: Vec<String>,
    retryable_ids: Vec<String>,
}

fn failed_batch(ids: &[String], reason: &str) -> BatchRound {
    BatchRound {
        errors: ids.iter().map(|id| format!("id={id}: {reason}")).collect(),
        ..BatchRound::default()
    }
}

/// Fetch `ids` in chunks of [`MAX_BATCH_SIZE`], re-batching retryable ids
/// with exponential backoff for up to [`MAX_BATCH_RETRIES`] extra rounds.
/// Ids still pending after the last round are reported as errors.
async fn fetch_with_retries<F, Fut>(ids: &[String], mut fetch_chunk: F) -> BatchFetch
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = BatchRound>,
{
    let mut fetched = BatchFetch::default();
    let mut pending = ids.to_vec();

    for round in 0..=MAX_BATCH_RETRIES {
        if pending.is_empty() {
            break;
        }
        if round > 0 {
            let backoff = Duration::from_secs(2u64.pow(round as u32));
            debug!(
                "batch retry round {round} for {} throttled ids (backoff {backoff:?})",
                pending.len()
            );
            sleep(backoff).await;
        }

        let mut next_round = Vec::new();
        for chunk in pending.chunks(MAX_BATCH_SIZE) {
            let part = fetch_chunk(chunk.to_vec()).await;
            fetched.messages.extend(part.messages);
            fetched.errors.extend(part.errors);
            next_round.extend(part.retryable_ids);
        }
        pending = next_round;
    }

    fetched.errors.extend(pending.into_iter().map(|id| {
        format!("id={id}: still throttled after {MAX_BATCH_RETRIES} retry rounds")
    }));
    fetched
}

/// Split a multipart/mixed batch response into messages. Parts map to the
/// sent ids by position. `429` sub-responses and ids missing from the
/// response are retryable; other failures are permanent.
fn parse_batch_response(body: &str, content_type: &str, sent_ids: &[String]) -> BatchRound {
    // Extract boundary from content-type header
    let boundary = content_type
        .split(';')
        .filter_map(|part| {
            part.trim()
                .strip_prefix("boundary=")
                .map(|value| value.trim_matches('"').to_string())
        })
        .next();

    let Some(boundary) = boundary else {
        // Nothing in the response is usable; ask for every id again
        return BatchRound {
            retryable_ids: sent_ids.to_vec(),
            ..BatchRound::default()
        };
    };

    let separator = format!("--{boundary}");
    let mut round = BatchRound::default();
    // Ids parsed, throttled or permanently failed
    let mut seen_ids = HashSet::new();
    let mut part_index = 0usize;

    for part in body.split(&separator) {
        let part = part.trim();
        if part.is_empty() || part.starts_with("--") {
            continue;
        }

        // Map this part to the sent id by position
        let current_id = sent_ids.get(part_index).cloned();
        part_index += 1;

        // Normalize line endings so only \n remains
        let normalized = part.replace("\r\n", "\n");

        // Find HTTP status line
        let Some(http_pos) = normalized.find("HTTP/1.1 ") else {
            continue;
        };

        let status_region = &normalized[http_pos..];
        let status_line_end = status_region.find('\n').unwrap_or(status_region.len());
        let status_line = &status_region[..status_line_end];

        // Find JSON body: first '{' after the status line
        let after_status = &normalized[http_pos + status_line_end..];
        let json_body = after_status
            .find('{')
            .map(|start| {
                let region = &after_status[start..];
                match find_json_object_end(region) {
                    Some(end) => &region[..end],
                    None => region.trim(),
                }
            })
            .unwrap_or("");

        // Throttled sub-request: retry in a later round
        if status_line.contains(" 429") {
            if let Some(id) = &current_id {
                seen_ids.insert(id.clone());
                round.retryable_ids.push(id.clone());
            }
            continue;
        }

        // Any other non-200 is permanent
        let label = current_id.as_deref().unwrap_or("?");
        if !status_line.contains(" 200") {
            if let Some(id) = &current_id {
                seen_ids.insert(id.clone());
            }
            round.errors.push(format!(
                "id={label}: batch sub-request failed: {} {}",
                status_line.trim(),
                redact_response_body(json_body)
            ));
            continue;
        }

        match serde_json::from_str::<ProviderMessage>(json_body) {
            Ok(message) => {
                seen_ids.insert(message.id.clone());
                if let Some(id) = &current_id {
                    seen_ids.insert(id.clone());
                }
                round.messages.push(message);
            }
            Err(e) => {
                if let Some(id) = &current_id {
                    seen_ids.insert(id.clone());
                }
                round.errors.push(format!(
                    "id={label}: batch response parse error: {e} body={}",
                    redact_response_body(json_body)
                ));
            }
        }
    }

    // Ids the response never mentioned (truncated body) are retryable too
    for id in sent_ids {
        if !seen_ids.contains(id) {
            round.retryable_ids.push(id.clone());
        }
    }

    round
}

/// Index one past the closing brace of the leading JSON object.
fn find_json_object_end(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct MessageList {
    messages: Option<Vec<MessageStub>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TokenFile {
    token: Option<String>,
    access_token: Option<String>,
}
