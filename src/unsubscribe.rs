use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::classifier::ClassifierClient;
use crate::models::Header;

static HEADER_HTTP_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(https?://[^>]+)>").expect("valid list-unsubscribe regex"));

/// First `http(s)` link of a `List-Unsubscribe` header, if any.
pub fn header_unsubscribe_url(headers: &[Header]) -> Option<String> {
    let value = headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("List-Unsubscribe"))
        .map(|h| h.value.as_str())?;

    HEADER_HTTP_LINK
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Find an opt-out URL for one email. The header is authoritative; the
/// classifier only scans the body when the header yields nothing. Errors
/// are logged and read as "no link".
pub async fn resolve_unsubscribe_url(
    classifier: &ClassifierClient,
    headers: &[Header],
    body: &str,
) -> Option<String> {
    if let Some(url) = header_unsubscribe_url(headers) {
        debug!("unsubscribe link from header: {url}");
        return Some(url);
    }

    debug!("no List-Unsubscribe link, scanning body");
    match classifier.find_unsubscribe_url(body).await {
        Ok(url) => url,
        Err(error) => {
            warn!("unsubscribe body scan failed: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{header_unsubscribe_url, resolve_unsubscribe_url};
    use crate::classifier::{ClassifierClient, RateLimiter, ScriptedClassifier};
    use crate::models::Header;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn client(backend: ScriptedClassifier) -> ClassifierClient {
        ClassifierClient::new(Box::new(backend), RateLimiter::unlimited())
    }

    #[tokio::test]
    async fn header_link_skips_the_classifier() {
        let backend = ScriptedClassifier::new(["https://body.example.com/u"]);
        let calls = backend.calls();
        let headers = vec![header(
            "list-unsubscribe",
            "<https://x.com/u>, <mailto:y@x.com>",
        )];

        let url = resolve_unsubscribe_url(&client(backend), &headers, "body").await;
        assert_eq!(url.as_deref(), Some("https://x.com/u"));
        assert!(calls.lock().expect("calls").is_empty());
    }

    #[tokio::test]
    async fn mailto_only_header_falls_back_to_body_scan() {
        let backend = ScriptedClassifier::new(["https://body.example.com/u"]);
        let calls = backend.calls();
        let headers = vec![header("List-Unsubscribe", "<mailto:leave@x.com>")];

        let url = resolve_unsubscribe_url(&client(backend), &headers, "body").await;
        assert_eq!(url.as_deref(), Some("https://body.example.com/u"));
        assert_eq!(calls.lock().expect("calls").len(), 1);
    }

    #[tokio::test]
    async fn classifier_none_means_no_link() {
        let backend = ScriptedClassifier::new(["None"]);
        let url = resolve_unsubscribe_url(&client(backend), &[], "body").await;
        assert!(url.is_none());
    }

    #[tokio::test]
    async fn classifier_failure_means_no_link() {
        let backend = ScriptedClassifier::failing("timeout");
        let url = resolve_unsubscribe_url(&client(backend), &[], "body").await;
        assert!(url.is_none());
    }

    #[test]
    fn header_prefers_first_http_link() {
        let headers = vec![header(
            "List-Unsubscribe",
            "<mailto:a@x.com>, <http://x.com/one>, <https://x.com/two>",
        )];
        assert_eq!(
            header_unsubscribe_url(&headers).as_deref(),
            Some("http://x.com/one")
        );
        assert!(header_unsubscribe_url(&[header("From", "<https://x.com>")]).is_none());
    }
}
