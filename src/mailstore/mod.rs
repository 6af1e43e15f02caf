use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Header;

pub mod gmail;
pub mod memory;

pub use gmail::GmailMailStore;
pub use memory::InMemoryMailStore;

pub const INBOX_LABEL: &str = "INBOX";
pub const UNREAD_LABEL: &str = "UNREAD";

/// How much of a message the provider should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// Headers and every body part.
    Full,
    /// Headers only.
    Metadata,
}

impl MessageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Metadata => "metadata",
        }
    }
}

/// Outcome of a coalesced fetch: the messages that came back, plus one
/// error line per id that did not.
#[derive(Debug, Clone, Default)]
pub struct BatchFetch {
    pub messages: Vec<ProviderMessage>,
    pub errors: Vec<String>,
}

/// Narrow view of the mail provider. Query strings use the provider's
/// search grammar (`in:inbox`, `is:unread`, `after:YYYY/MM/DD`, ...).
#[async_trait(?Send)]
pub trait MailStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<String>>;

    async fn get(&self, id: &str, format: MessageFormat) -> Result<ProviderMessage>;

    async fn batch_get(&self, ids: &[String], format: MessageFormat) -> Result<BatchFetch>;

    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<()>;

    async fn trash(&self, id: &str) -> Result<()>;
}

// --- Provider payload types (Gmail `users.messages` resource) ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderMessage {
    pub id: String,
    #[serde(rename = "threadId", default)]
    pub thread_id: Option<String>,
    #[serde(rename = "labelIds", default)]
    pub label_ids: Option<Vec<String>>,
    #[serde(default)]
    pub snippet: Option<String>,
    pub payload: MessagePart,
    #[serde(rename = "internalDate", default)]
    pub internal_date: Option<String>,
}

impl ProviderMessage {
    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|l| l == label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessagePart {
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<Header>>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Option<Vec<MessagePart>>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl MessagePart {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Inline base64url data, when the part carries any.
    pub fn inline_data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| body.data.as_deref())
            .filter(|data| !data.is_empty())
    }

    pub fn is_multipart(&self) -> bool {
        self.parts.as_ref().is_some_and(|parts| !parts.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PartBody {
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(rename = "attachmentId", default)]
    pub attachment_id: Option<String>,
}
