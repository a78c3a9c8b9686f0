//! Deterministic backend for tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::CompletionBackend;
use crate::error::ResolverError;
use crate::prompt::Prompt;
use crate::Result;

/// Mock completion backend returning a canned reply without network calls.
///
/// Clones share the call counter and the recorded prompts.
#[derive(Debug, Clone)]
pub struct MockBackend {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: usize,
    last_prompt: Option<Prompt>,
}

impl MockBackend {
    /// Backend answering every prompt with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Backend failing every prompt with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            delay: None,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of prompts received.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls
    }

    /// The most recent prompt received.
    pub fn last_prompt(&self) -> Option<Prompt> {
        self.state.lock().last_prompt.clone()
    }
}

impl CompletionBackend for MockBackend {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        {
            let mut state = self.state.lock();
            state.calls += 1;
            state.last_prompt = Some(prompt.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.reply.clone().map_err(ResolverError::Backend)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> Prompt {
        Prompt {
            system: "s".to_string(),
            user: "u".to_string(),
            max_output_tokens: 1,
        }
    }

    #[tokio::test]
    async fn test_mock_reply_and_call_count() {
        let backend = MockBackend::new("{}");
        let shared = backend.clone();

        assert_eq!(backend.complete(&prompt()).await.unwrap(), "{}");
        assert_eq!(backend.complete(&prompt()).await.unwrap(), "{}");
        assert_eq!(shared.call_count(), 2);
        assert_eq!(shared.last_prompt().unwrap().user, "u");
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let backend = MockBackend::failing("boom");
        let err = backend.complete(&prompt()).await.unwrap_err();
        assert!(matches!(err, ResolverError::Backend(msg) if msg == "boom"));
    }
}
