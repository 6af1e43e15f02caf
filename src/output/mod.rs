pub mod json;
pub mod table;

use anyhow::Result;

use crate::models::{AnalyzedEmail, UnsubscribeCandidate};
use crate::workflow::{ActionStatus, DashboardReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Table
        }
    }
}

pub fn format_analyzed_emails(format: OutputFormat, emails: &[AnalyzedEmail]) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_analyzed_emails(emails)),
        OutputFormat::Json => json::format_analyzed_emails(emails),
    }
}

pub fn format_unsubscribe_candidates(
    format: OutputFormat,
    candidates: &[UnsubscribeCandidate],
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_unsubscribe_candidates(candidates)),
        OutputFormat::Json => json::format_unsubscribe_candidates(candidates),
    }
}

pub fn format_dashboard(format: OutputFormat, dashboard: &DashboardReport) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_dashboard(dashboard)),
        OutputFormat::Json => json::format_dashboard(dashboard),
    }
}

pub fn format_action_status(format: OutputFormat, status: &ActionStatus) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(table::format_action_status(status)),
        OutputFormat::Json => json::format_action_status(status),
    }
}
