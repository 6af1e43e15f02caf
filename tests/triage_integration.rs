use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::NaiveDate;
use serde_json::{json, Value};

use inboxiq::classifier::{ClassifierClient, RateLimiter, ScriptedClassifier};
use inboxiq::config::Settings;
use inboxiq::mailstore::{InMemoryMailStore, ProviderMessage};
use inboxiq::metadata::DateRange;
use inboxiq::models::{AnalyzedEmail, Category};
use inboxiq::output::{self, OutputFormat};
use inboxiq::workflow::TriageSession;

fn encode(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

fn headers(from: &str, subject: &str, date: &str) -> Value {
    json!([
        { "name": "From", "value": from },
        { "name": "Subject", "value": subject },
        { "name": "Date", "value": date }
    ])
}

fn plain_message(id: &str, labels: &[&str], subject: &str, body: &str) -> ProviderMessage {
    serde_json::from_value(json!({
        "id": id,
        "threadId": format!("t-{id}"),
        "labelIds": labels,
        "payload": {
            "mimeType": "text/plain",
            "headers": headers("Team <team@corp.example>", subject, "Mon, 06 Jan 2025 09:15:00 +0000"),
            "body": { "size": body.len(), "data": encode(body) }
        }
    }))
    .expect("build plain message")
}

fn multipart_message(id: &str, plain: Option<&str>, html: &str) -> ProviderMessage {
    let mut parts = Vec::new();
    if let Some(plain) = plain {
        parts.push(json!({
            "mimeType": "text/plain",
            "body": { "size": plain.len(), "data": encode(plain) }
        }));
    }
    parts.push(json!({
        "mimeType": "text/html",
        "body": { "size": html.len(), "data": encode(html) }
    }));

    serde_json::from_value(json!({
        "id": id,
        "labelIds": ["INBOX", "UNREAD"],
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": headers("Shop <deals@shop.example>", "Weekly sale", "Tue, 07 Jan 2025 18:00:00 +0000"),
            "parts": parts
        }
    }))
    .expect("build multipart message")
}

fn analysis_reply(category: Category, priority: u8) -> String {
    json!({
        "category": category.label(),
        "priority": priority,
        "summary": format!("Priority {priority} mail."),
    })
    .to_string()
}

fn client(backend: ScriptedClassifier) -> ClassifierClient {
    ClassifierClient::new(Box::new(backend), RateLimiter::unlimited())
}

#[tokio::test]
async fn priority_pass_returns_top_two_descending() {
    let store = InMemoryMailStore::new(vec![
        plain_message("a", &["INBOX", "UNREAD"], "Lunch", "Want to grab lunch?"),
        plain_message("b", &["INBOX", "UNREAD"], "Server down", "Production is down."),
        plain_message("c", &["INBOX", "UNREAD"], "Receipt", "Thanks for your order."),
    ]);
    let classifier = client(ScriptedClassifier::new([
        analysis_reply(Category::PersonalConversation, 2),
        analysis_reply(Category::UrgentActionRequired, 9),
        analysis_reply(Category::TransactionReceipt, 5),
    ]));
    let settings = Settings {
        display_limit: 2,
        ..Settings::default()
    };
    let session = TriageSession::new(&store, &classifier, settings);

    let ranked = session.priority_unread(|_, _| {}).await;
    let priorities: Vec<u8> = ranked.iter().map(AnalyzedEmail::priority).collect();
    assert_eq!(priorities, vec![9, 5]);
    assert_eq!(ranked[0].analysis.category, Category::UrgentActionRequired);
    assert_eq!(ranked[0].email.sender, "team@corp.example");

    let rendered = output::format_analyzed_emails(OutputFormat::Json, &ranked).expect("render");
    let decoded: Value = serde_json::from_str(&rendered).expect("decode rendered json");
    assert_eq!(decoded[0]["analysis"]["category"], "Urgent/Action Required");
    assert_eq!(decoded[1]["analysis"]["priority"], 5);
}

#[tokio::test]
async fn classifier_sees_plain_part_and_stripped_html() {
    let store = InMemoryMailStore::new(vec![
        multipart_message("both", Some("Plain wins."), "<p>HTML loses.</p>"),
        multipart_message(
            "html-only",
            None,
            "<html><body><h1>Big Sale</h1><p>Save <b>50%</b> today</p></body></html>",
        ),
    ]);
    let backend = ScriptedClassifier::new([
        analysis_reply(Category::NewsletterPromotional, 3),
        analysis_reply(Category::NewsletterPromotional, 2),
    ]);
    let calls = backend.calls();
    let classifier = client(backend);
    let session = TriageSession::new(&store, &classifier, Settings::default());

    let ranked = session.priority_unread(|_, _| {}).await;
    assert_eq!(ranked.len(), 2);

    let calls = calls.lock().expect("calls");
    assert_eq!(calls[0].text, "Plain wins.");
    let html_text = &calls[1].text;
    assert!(html_text.contains("Big Sale"));
    assert!(html_text.contains("50%"));
    assert!(!html_text.contains('<'));
}

#[tokio::test]
async fn unsubscribe_header_wins_without_classifier_call() {
    let mut message = multipart_message("n1", Some("This week's newsletter."), "<p>x</p>");
    message
        .payload
        .headers
        .get_or_insert_with(Vec::new)
        .push(serde_json::from_value(json!({
            "name": "List-Unsubscribe",
            "value": "<mailto:leave@shop.example>, <https://shop.example/unsub?u=1>"
        }))
        .expect("build header"));
    let store = InMemoryMailStore::new(vec![message]);
    let backend = ScriptedClassifier::default();
    let calls = backend.calls();
    let classifier = client(backend);
    let session = TriageSession::new(&store, &classifier, Settings::default());

    let candidates = session.unsubscribe_sweep(|_, _| {}).await;
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].url, "https://shop.example/unsub?u=1");
    assert_eq!(candidates[0].subject, "Weekly sale");
    assert!(calls.lock().expect("calls").is_empty());
}

#[tokio::test]
async fn dashboard_aggregates_inbox_metadata() {
    let store = InMemoryMailStore::new(vec![
        plain_message("a", &["INBOX"], "One", "x"),
        plain_message("b", &["INBOX"], "Two", "y"),
        multipart_message("c", Some("z"), "<p>z</p>"),
        plain_message("d", &["SENT"], "Sent", "not counted"),
    ]);
    let classifier = client(ScriptedClassifier::default());
    let session = TriageSession::new(&store, &classifier, Settings::default());

    let range = DateRange::new(NaiveDate::from_ymd_opt(2025, 1, 1), None);
    let dashboard = session.dashboard(&range, |_, _| {}).await;
    let stats = &dashboard.stats;

    assert_eq!(stats.total, 3);
    assert_eq!(stats.top_senders[0].key, "team@corp.example");
    assert_eq!(stats.top_senders[0].count, 2);
    assert_eq!(stats.top_domains[0].key, "corp.example");
    assert_eq!(stats.by_hour[9], 2);
    assert_eq!(stats.by_hour[18], 1);
    assert_eq!(stats.by_weekday[0], 2);
    assert_eq!(stats.by_weekday[1], 1);
    assert_eq!(stats.by_day.len(), 2);
    assert!(dashboard.report.contains("Scanned 3 emails"));
    assert_eq!(store.queries(), vec!["in:inbox after:2025/01/01"]);

    let rendered = output::format_dashboard(OutputFormat::Table, &dashboard).expect("render");
    assert!(rendered.contains("Top domains"));
}

#[tokio::test]
async fn archive_and_delete_report_outcomes() {
    let store = InMemoryMailStore::new(vec![
        plain_message("a", &["INBOX", "UNREAD"], "One", "x"),
        plain_message("b", &["INBOX"], "Two", "y"),
    ]);
    let classifier = client(ScriptedClassifier::default());
    let session = TriageSession::new(&store, &classifier, Settings::default());

    let archived = session.archive("a").await;
    assert!(archived.success, "{}", archived.message);
    assert_eq!(store.labels_of("a"), Some(vec!["UNREAD".to_string()]));

    let deleted = session.delete("b").await;
    let rendered = output::format_action_status(OutputFormat::Json, &deleted).expect("render");
    let decoded: Value = serde_json::from_str(&rendered).expect("decode status");
    assert_eq!(decoded["action"], "delete");
    assert_eq!(decoded["success"], true);
    assert_eq!(store.trashed(), vec!["b"]);
}
