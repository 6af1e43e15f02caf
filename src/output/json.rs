use anyhow::Result;

use crate::models::{AnalyzedEmail, UnsubscribeCandidate};
use crate::workflow::{ActionStatus, DashboardReport};

pub fn format_analyzed_emails(emails: &[AnalyzedEmail]) -> Result<String> {
    Ok(serde_json::to_string_pretty(emails)?)
}

pub fn format_unsubscribe_candidates(candidates: &[UnsubscribeCandidate]) -> Result<String> {
    Ok(serde_json::to_string_pretty(candidates)?)
}

pub fn format_dashboard(dashboard: &DashboardReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(dashboard)?)
}

pub fn format_action_status(status: &ActionStatus) -> Result<String> {
    Ok(serde_json::to_string_pretty(status)?)
}
