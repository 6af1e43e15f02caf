use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, TriageError};
use crate::mailstore::{BatchFetch, MailStore, MessageFormat, ProviderMessage, INBOX_LABEL, UNREAD_LABEL};

/// Offline `MailStore` over a fixed set of messages.
///
/// `list` understands `in:inbox`, `is:unread` and `is:read`; other query
/// terms are accepted and ignored. Every query and mutation is recorded so
/// callers can inspect what was asked of the provider.
#[derive(Debug, Default)]
pub struct InMemoryMailStore {
    messages: Mutex<Vec<ProviderMessage>>,
    failing_ids: HashSet<String>,
    queries: Mutex<Vec<String>>,
    trashed: Mutex<Vec<String>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl InMemoryMailStore {
    pub fn new(messages: Vec<ProviderMessage>) -> Self {
        Self {
            messages: Mutex::new(messages),
            ..Self::default()
        }
    }

    /// Make every fetch of `id` fail with a transport error.
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }

    pub fn trashed(&self) -> Vec<String> {
        lock(&self.trashed).clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        lock(&self.batch_sizes).clone()
    }

    pub fn labels_of(&self, id: &str) -> Option<Vec<String>> {
        lock(&self.messages)
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.label_ids.clone().unwrap_or_default())
    }

    fn lookup(&self, id: &str) -> Result<ProviderMessage> {
        if self.failing_ids.contains(id) {
            return Err(TriageError::Transport(format!("simulated failure for {id}")));
        }
        lock(&self.messages)
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| TriageError::Transport(format!("message not found: {id}")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn matches_query(message: &ProviderMessage, query: &str) -> bool {
    query.split_whitespace().all(|term| match term.to_ascii_lowercase().as_str() {
        "in:inbox" => message.has_label(INBOX_LABEL),
        "is:unread" => message.has_label(UNREAD_LABEL),
        "is:read" => !message.has_label(UNREAD_LABEL),
        _ => true,
    })
}

#[async_trait(?Send)]
impl MailStore for InMemoryMailStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, query: &str, max_results: usize) -> Result<Vec<String>> {
        lock(&self.queries).push(query.to_string());
        Ok(lock(&self.messages)
            .iter()
            .filter(|m| matches_query(m, query))
            .take(max_results)
            .map(|m| m.id.clone())
            .collect())
    }

    async fn get(&self, id: &str, _format: MessageFormat) -> Result<ProviderMessage> {
        self.lookup(id)
    }

    async fn batch_get(&self, ids: &[String], _format: MessageFormat) -> Result<BatchFetch> {
        lock(&self.batch_sizes).push(ids.len());
        let mut fetched = BatchFetch::default();
        for id in ids {
            match self.lookup(id) {
                Ok(message) => fetched.messages.push(message),
                Err(error) => fetched.errors.push(format!("id={id}: {error}")),
            }
        }
        Ok(fetched)
    }

    async fn modify(&self, id: &str, remove_labels: &[&str]) -> Result<()> {
        let mut messages = lock(&self.messages);
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| TriageError::Transport(format!("message not found: {id}")))?;
        if let Some(labels) = message.label_ids.as_mut() {
            labels.retain(|label| !remove_labels.contains(&label.as_str()));
        }
        Ok(())
    }

    async fn trash(&self, id: &str) -> Result<()> {
        let mut messages = lock(&self.messages);
        let before = messages.len();
        messages.retain(|m| m.id != id);
        if messages.len() == before {
            return Err(TriageError::Transport(format!("message not found: {id}")));
        }
        lock(&self.trashed).push(id.to_string());
        Ok(())
    }
}
