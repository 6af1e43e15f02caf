use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::gemini::DEFAULT_MODEL;
use crate::error::{Result, TriageError};
use crate::mailstore::gmail::parse_token_file;

pub const DEFAULT_SIFT_SCAN_SIZE: usize = 25;
pub const DEFAULT_DISPLAY_LIMIT: usize = 5;
pub const DEFAULT_UNSUBSCRIBE_SCAN_SIZE: usize = 40;
pub const DEFAULT_DASHBOARD_MAX_EMAILS: usize = 200;
pub const DEFAULT_CLASSIFIER_INTERVAL: Duration = Duration::from_secs(1);

/// Tunables for one triage session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Messages fetched and classified per priority or cleanup pass.
    pub sift_scan_size: usize,
    /// Results kept after sorting.
    pub display_limit: usize,
    pub unsubscribe_scan_size: usize,
    pub dashboard_max_emails: usize,
    /// Minimum spacing between classifier calls.
    pub classifier_interval: Duration,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sift_scan_size: DEFAULT_SIFT_SCAN_SIZE,
            display_limit: DEFAULT_DISPLAY_LIMIT,
            unsubscribe_scan_size: DEFAULT_UNSUBSCRIBE_SCAN_SIZE,
            dashboard_max_emails: DEFAULT_DASHBOARD_MAX_EMAILS,
            classifier_interval: DEFAULT_CLASSIFIER_INTERVAL,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

pub fn default_token_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TriageError::Validation("failed to determine home directory".to_string()))?;
    Ok(home.join(".inboxiq").join("token.json"))
}

/// Gmail access token: an explicit value wins, otherwise the token file.
pub fn resolve_gmail_token(explicit: Option<&str>, token_path: &Path) -> Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let raw = std::fs::read_to_string(token_path).map_err(|e| {
        TriageError::Validation(format!(
            "no Gmail token: set INBOXIQ_GMAIL_TOKEN or create {} ({e})",
            token_path.display()
        ))
    })?;
    parse_token_file(&raw)
}

/// First non-blank key among the candidates, in order.
pub fn resolve_api_key<I>(candidates: I) -> Result<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .ok_or_else(|| {
            TriageError::Validation("no model API key: set INBOXIQ_API_KEY or API_KEY".to_string())
        })
}
