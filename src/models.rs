use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A normalized message ready for analysis. Identity is the provider id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub headers: Vec<Header>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Newsletter/Promotional")]
    NewsletterPromotional,
    #[serde(rename = "Personal Conversation")]
    PersonalConversation,
    #[serde(rename = "Urgent/Action Required")]
    UrgentActionRequired,
    #[serde(rename = "Transaction/Receipt")]
    TransactionReceipt,
    #[serde(rename = "Notification")]
    Notification,
    #[serde(rename = "Spam")]
    Spam,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::NewsletterPromotional,
        Self::PersonalConversation,
        Self::UrgentActionRequired,
        Self::TransactionReceipt,
        Self::Notification,
        Self::Spam,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::NewsletterPromotional => "Newsletter/Promotional",
            Self::PersonalConversation => "Personal Conversation",
            Self::UrgentActionRequired => "Urgent/Action Required",
            Self::TransactionReceipt => "Transaction/Receipt",
            Self::Notification => "Notification",
            Self::Spam => "Spam",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Analysis {
    pub category: Category,
    /// 1 (ignorable) to 10 (needs immediate attention).
    pub priority: u8,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnalyzedEmail {
    pub email: Email,
    pub analysis: Analysis,
}

impl AnalyzedEmail {
    pub fn priority(&self) -> u8 {
        self.analysis.priority
    }
}

/// Header-only projection of a message, used for inbox statistics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetadataRecord {
    pub sender: String,
    pub sender_email: String,
    /// Empty when the sender address has no `@`.
    pub sender_domain: String,
    pub date: DateTime<Utc>,
    pub hour: u32,
    pub day_of_week: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnsubscribeCandidate {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub url: String,
}
