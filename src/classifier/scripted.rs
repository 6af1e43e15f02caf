use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::classifier::{Classifier, ResponseShape};
use crate::error::{Result, TriageError};

/// One request as seen by a [`ScriptedClassifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub text: String,
    pub instructions: String,
    pub shape: ResponseShape,
}

/// Offline classifier that replays canned replies in order and records
/// every request. Once the script runs out each call fails with a
/// transport error.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedClassifier {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            calls: Arc::default(),
        }
    }

    /// A classifier whose every call fails with `reason`.
    pub fn failing(reason: &str) -> Self {
        Self::default().then_fail(reason)
    }

    /// Append a transport failure to the script.
    pub fn then_fail(self, reason: &str) -> Self {
        self.push(Err(reason.to_string()));
        self
    }

    /// Shared handle on the recorded calls; stays valid after the
    /// classifier is boxed.
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }

    fn push(&self, reply: Result<String, String>) {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(reply);
    }
}

#[async_trait(?Send)]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(
        &self,
        text: &str,
        instructions: &str,
        shape: ResponseShape,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RecordedCall {
                text: text.to_string(),
                instructions: instructions.to_string(),
                shape,
            });

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(TriageError::Transport(reason)),
            None => Err(TriageError::Transport("script exhausted".to_string())),
        }
    }
}
