//! Mock completion backend for deterministic testing.
//!
//! Replies are scripted: each call pops the next [`MockReply`] from the queue
//! and falls back to a fixed default response once the queue is drained.
//!
//! ## Usage
//!
//! ```rust
//! use tidytask_inference::mock::{MockCompletionBackend, MockReply};
//!
//! let backend = MockCompletionBackend::new()
//!     .with_reply(MockReply::transient("upstream 503"))
//!     .with_reply(MockReply::content(r#"{"title": "Call Bob"}"#));
//! assert_eq!(backend.call_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tidytask_core::{
    Completion, CompletionBackend, CompletionRequest, Error, Result, TokenUsage,
};

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Successful completion with this content.
    Content(String),
    /// `Error::Unavailable`, eligible for retry.
    Transient(String),
    /// `Error::ExternalService`, not retried.
    Fatal(String),
}

impl MockReply {
    pub fn content(s: impl Into<String>) -> Self {
        Self::Content(s.into())
    }

    pub fn transient(s: impl Into<String>) -> Self {
        Self::Transient(s.into())
    }

    pub fn fatal(s: impl Into<String>) -> Self {
        Self::Fatal(s.into())
    }
}

type RequestHook = Arc<dyn Fn(&CompletionRequest) + Send + Sync>;

/// Mock completion backend for testing.
#[derive(Clone)]
pub struct MockCompletionBackend {
    model: String,
    default_response: String,
    latency: Option<Duration>,
    hook: Option<RequestHook>,
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    call_log: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockCompletionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionBackend {
    /// Create a new mock backend that answers `{}` to everything.
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            default_response: "{}".to_string(),
            latency: None,
            hook: None,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the response returned once the scripted queue is empty.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = response.into();
        self
    }

    /// Queue one scripted reply.
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Run `hook` inside every call, before the simulated latency. Tests use
    /// this to mutate stores while a run is in flight.
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CompletionRequest) + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Queue a reply on an already-shared backend.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of completion calls received.
    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }
}

#[async_trait]
impl CompletionBackend for MockCompletionBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        if let Some(hook) = &self.hook {
            hook(&request);
        }
        self.call_log.lock().unwrap().push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(MockReply::Transient(msg)) => Err(Error::Unavailable(msg)),
            Some(MockReply::Fatal(msg)) => Err(Error::ExternalService(msg)),
            Some(MockReply::Content(content)) => Ok(Completion {
                content,
                usage: TokenUsage::default(),
            }),
            None => Ok(Completion {
                content: self.default_response.clone(),
                usage: TokenUsage::default(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
