//! The four triage passes plus the two single-message actions, run against
//! an explicit session context.

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::ClassifierClient;
use crate::config::Settings;
use crate::error::Result;
use crate::mailstore::{MailStore, MessageFormat, INBOX_LABEL};
use crate::metadata::{fetch_metadata, DateRange};
use crate::models::{AnalyzedEmail, Email, UnsubscribeCandidate};
use crate::parser::parse_message;
use crate::stats::{build_stats, summary_report, InboxStats};
use crate::unsubscribe::resolve_unsubscribe_url;

pub const PRIORITY_QUERY: &str = "in:inbox is:unread";
pub const CLEANUP_QUERY: &str = "in:inbox is:read";
pub const UNSUBSCRIBE_QUERY: &str = "in:inbox";

/// Subject or body must mention one of these (case-insensitive) before an
/// unsubscribe lookup is attempted.
pub const UNSUBSCRIBE_KEYWORDS: [&str; 10] = [
    "newsletter",
    "promotion",
    "deals",
    "sale",
    "weekly",
    "daily",
    "update",
    "exclusive",
    "offer",
    "unsubscribe",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriageAction {
    Archive,
    Delete,
}

impl TriageAction {
    fn verb(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Delete => "delete",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Archive => "archived",
            Self::Delete => "moved to trash",
        }
    }
}

/// Result of a single-message action. Failures are carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionStatus {
    pub id: String,
    pub action: TriageAction,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub stats: InboxStats,
    pub report: String,
}

/// Order by priority. Ties keep their input order.
pub fn sort_by_priority(mut emails: Vec<AnalyzedEmail>, descending: bool) -> Vec<AnalyzedEmail> {
    if descending {
        emails.sort_by(|a, b| b.priority().cmp(&a.priority()));
    } else {
        emails.sort_by_key(AnalyzedEmail::priority);
    }
    emails
}

pub fn matches_unsubscribe_keywords(email: &Email) -> bool {
    let subject = email.subject.to_lowercase();
    let body = email.body.to_lowercase();
    UNSUBSCRIBE_KEYWORDS
        .iter()
        .any(|keyword| subject.contains(keyword) || body.contains(keyword))
}

pub struct TriageSession<'a> {
    store: &'a dyn MailStore,
    classifier: &'a ClassifierClient,
    settings: Settings,
}

impl<'a> TriageSession<'a> {
    pub fn new(store: &'a dyn MailStore, classifier: &'a ClassifierClient, settings: Settings) -> Self {
        Self {
            store,
            classifier,
            settings,
        }
    }

    /// Fetch and parse up to `max_results` messages matching `query`.
    /// Messages that fail to fetch or parse, or whose body is empty, are
    /// left out.
    pub async fn fetch_emails(&self, query: &str, max_results: usize) -> Vec<Email> {
        let ids = match self.store.list(query, max_results).await {
            Ok(ids) => ids,
            Err(error) => {
                warn!("listing '{query}' on {} failed: {error}", self.store.name());
                return Vec::new();
            }
        };
        info!("{} messages match '{query}'", ids.len());

        let mut emails = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.fetch_one(id).await {
                Ok(email) if email.body.trim().is_empty() => {
                    info!("skipping {id}: empty body");
                }
                Ok(email) => emails.push(email),
                Err(error) => warn!("skipping {id}: {error}"),
            }
        }
        emails
    }

    async fn fetch_one(&self, id: &str) -> Result<Email> {
        let message = self.store.get(id, MessageFormat::Full).await?;
        parse_message(&message)
    }

    async fn analyze_all(
        &self,
        emails: Vec<Email>,
        progress: &mut impl FnMut(f32, &str),
    ) -> Vec<AnalyzedEmail> {
        let total = emails.len();
        let mut analyzed = Vec::with_capacity(total);
        for (idx, email) in emails.into_iter().enumerate() {
            progress(fraction(idx + 1, total), &format!("Analyzing email {}/{total}...", idx + 1));
            match self.classifier.analyze(&email.body).await {
                Ok(analysis) => analyzed.push(AnalyzedEmail { email, analysis }),
                Err(error) => warn!(
                    "analysis of {} by {} failed: {error}",
                    email.id,
                    self.classifier.backend_name()
                ),
            }
        }
        analyzed
    }

    async fn ranked_pass(
        &self,
        query: &str,
        descending: bool,
        mut progress: impl FnMut(f32, &str),
    ) -> Vec<AnalyzedEmail> {
        progress(0.0, "Fetching emails...");
        let emails = self.fetch_emails(query, self.settings.sift_scan_size).await;
        let analyzed = self.analyze_all(emails, &mut progress).await;

        let mut ranked = sort_by_priority(analyzed, descending);
        ranked.truncate(self.settings.display_limit);
        progress(1.0, "Done.");
        ranked
    }

    /// Most urgent unread mail first.
    pub async fn priority_unread(&self, progress: impl FnMut(f32, &str)) -> Vec<AnalyzedEmail> {
        self.ranked_pass(PRIORITY_QUERY, true, progress).await
    }

    /// Least important read mail first: archive or delete candidates.
    pub async fn low_priority_read(&self, progress: impl FnMut(f32, &str)) -> Vec<AnalyzedEmail> {
        self.ranked_pass(CLEANUP_QUERY, false, progress).await
    }

    pub async fn unsubscribe_sweep(
        &self,
        mut progress: impl FnMut(f32, &str),
    ) -> Vec<UnsubscribeCandidate> {
        progress(0.0, "Fetching emails...");
        let emails = self
            .fetch_emails(UNSUBSCRIBE_QUERY, self.settings.unsubscribe_scan_size)
            .await;

        let total = emails.len();
        let mut candidates = Vec::new();
        for (idx, email) in emails.into_iter().enumerate() {
            progress(fraction(idx + 1, total), &format!("Checking email {}/{total}...", idx + 1));
            if !matches_unsubscribe_keywords(&email) {
                continue;
            }
            if let Some(url) =
                resolve_unsubscribe_url(self.classifier, &email.headers, &email.body).await
            {
                candidates.push(UnsubscribeCandidate {
                    id: email.id,
                    sender: email.sender,
                    subject: email.subject,
                    url,
                });
            }
        }
        progress(1.0, "Done.");
        candidates
    }

    /// Take the message out of the inbox without deleting it.
    pub async fn archive(&self, id: &str) -> ActionStatus {
        let outcome = self.store.modify(id, &[INBOX_LABEL]).await;
        action_status(id, TriageAction::Archive, outcome)
    }

    /// Move the message to the provider's trash.
    pub async fn delete(&self, id: &str) -> ActionStatus {
        let outcome = self.store.trash(id).await;
        action_status(id, TriageAction::Delete, outcome)
    }

    pub async fn dashboard(
        &self,
        range: &DateRange,
        mut progress: impl FnMut(f32, &str),
    ) -> DashboardReport {
        progress(0.0, "Fetching email metadata...");
        let records = fetch_metadata(self.store, range, self.settings.dashboard_max_emails).await;

        progress(0.9, "Building statistics...");
        let stats = build_stats(&records);
        let report = summary_report(&stats);
        progress(1.0, "Done.");
        DashboardReport { stats, report }
    }
}

fn action_status(id: &str, action: TriageAction, outcome: Result<()>) -> ActionStatus {
    match outcome {
        Ok(()) => ActionStatus {
            id: id.to_string(),
            action,
            success: true,
            message: format!("Email {id} {}.", action.past_tense()),
        },
        Err(error) => {
            warn!("{} of {id} failed: {error}", action.verb());
            ActionStatus {
                id: id.to_string(),
                action,
                success: false,
                message: format!("Could not {} email {id}: {error}", action.verb()),
            }
        }
    }
}

fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 {
        1.0
    } else {
        done as f32 / total as f32
    }
}
