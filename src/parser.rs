//! Provider payload → normalized [`Email`].
//!
//! Body selection prefers a `text/plain` part, falls back to a `text/html`
//! part rendered to plain text, then to single-part inline data.

use std::sync::LazyLock;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use html2text::render::text_renderer::TrivialDecorator;
use regex::Regex;
use tracing::warn;

use crate::error::{Result, TriageError};
use crate::mailstore::{MessagePart, ProviderMessage};
use crate::models::Email;

pub const NO_SUBJECT: &str = "No Subject";
const HTML_WRAP_WIDTH: usize = 120;

/// Gmail emits base64url, sometimes padded and sometimes not.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(.+?)>").expect("valid angle address regex"));
static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid markup regex"));

pub fn parse_message(message: &ProviderMessage) -> Result<Email> {
    let payload = &message.payload;
    let headers = payload
        .headers
        .clone()
        .ok_or_else(|| TriageError::Parse(format!("message {} has no headers", message.id)))?;

    let sender = extract_address(payload.header("From").unwrap_or_default());
    let subject = payload
        .header("Subject")
        .unwrap_or(NO_SUBJECT)
        .to_string();
    let body = extract_body(payload)?;

    Ok(Email {
        id: message.id.clone(),
        sender,
        subject,
        body,
        headers,
    })
}

/// The address inside `<...>` when present, else the raw value verbatim.
pub fn extract_address(from: &str) -> String {
    ANGLE_ADDRESS
        .captures(from)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| from.to_string())
}

pub fn extract_body(payload: &MessagePart) -> Result<String> {
    if payload.is_multipart() {
        if let Some(data) = find_part_data(payload, "text/plain") {
            return decode_body_data(data);
        }
        if let Some(data) = find_part_data(payload, "text/html") {
            return Ok(html_to_text(&decode_body_data(data)?));
        }
        return Ok(String::new());
    }

    let Some(data) = payload.inline_data() else {
        return Ok(String::new());
    };
    let decoded = decode_body_data(data)?;
    if mime_type(payload) == "text/html" {
        Ok(html_to_text(&decoded))
    } else {
        Ok(decoded)
    }
}

/// Depth-first search for the first non-attachment part of `wanted` type
/// that carries inline data.
fn find_part_data<'a>(payload: &'a MessagePart, wanted: &str) -> Option<&'a str> {
    for part in payload.parts.as_deref().unwrap_or_default() {
        let is_attachment = part.filename.as_deref().is_some_and(|f| !f.is_empty());
        if !is_attachment && mime_type(part) == wanted {
            if let Some(data) = part.inline_data() {
                return Some(data);
            }
        }
        if let Some(data) = find_part_data(part, wanted) {
            return Some(data);
        }
    }
    None
}

fn mime_type(part: &MessagePart) -> String {
    part.mime_type
        .as_deref()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Decode base64url body data as UTF-8, replacing invalid sequences.
pub fn decode_body_data(data: &str) -> Result<String> {
    let bytes = BASE64URL
        .decode(data.trim())
        .map_err(|e| TriageError::Parse(format!("base64url decode body data: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Render HTML as plain text, one line per block element.
pub fn html_to_text(html: &str) -> String {
    let rendered = std::panic::catch_unwind(|| {
        html2text::from_read_with_decorator(html.as_bytes(), HTML_WRAP_WIDTH, TrivialDecorator::new())
    })
    .unwrap_or_else(|_| {
        warn!("html renderer panicked, falling back to tag stripping");
        MARKUP_TAG.replace_all(html, "\n").into_owned()
    });

    rendered
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
