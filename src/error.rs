use thiserror::Error;

/// Failures raised by the provider, the classifier, or payload parsing.
///
/// Workflow code catches these at the smallest scope and turns them into
/// absence (a skipped message, an empty batch, `None`).
#[derive(Debug, Error)]
pub enum TriageError {
    /// Provider or classifier unreachable, or the request was rejected.
    #[error("transport: {0}")]
    Transport(String),

    /// Malformed payload, bad date, or unreadable structured response.
    #[error("parse: {0}")]
    Parse(String),

    /// Result missing required fields or carrying out-of-range values.
    #[error("validation: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for TriageError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

pub type Result<T, E = TriageError> = std::result::Result<T, E>;
