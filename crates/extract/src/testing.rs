use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};

use crate::error::{ExtractError, Result};
use crate::llm::ExtractionBackend;
use crate::normalizer::normalize_response;
use crate::schema::ExtractionResult;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this result as-is.
    Result(ExtractionResult),
    /// Run this raw model output through response normalization.
    Raw(String),
    /// Fail with a malformed-response error carrying this message.
    Failure(String),
}

/// Record of a call made to the mock backend.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub text: String,
    pub previous: Option<ExtractionResult>,
}

/// A mock backend that replays scripted replies in order.
///
/// Once the script runs out every call returns an empty result. A gated
/// mock holds each call until [`MockBackend::release`] grants it a permit.
/// Each call takes its reply when it starts, so a call abandoned while held
/// still consumes one.
#[derive(Clone)]
pub struct MockBackend {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    gate: Option<Arc<Semaphore>>,
    started: Arc<watch::Sender<usize>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        let (started, _) = watch::channel(0);
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            gate: None,
            started: Arc::new(started),
        }
    }

    /// Calls block until released.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.replies.lock().push_back(reply);
        self
    }

    pub fn with_result(self, result: ExtractionResult) -> Self {
        self.with_reply(MockReply::Result(result))
    }

    pub fn with_raw(self, raw: impl Into<String>) -> Self {
        self.with_reply(MockReply::Raw(raw.into()))
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.with_reply(MockReply::Failure(message.into()))
    }

    /// Let `n` held calls proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= n).await;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ExtractionBackend for MockBackend {
    async fn extract(
        &self,
        text: &str,
        previous: Option<&ExtractionResult>,
    ) -> Result<ExtractionResult> {
        self.calls.lock().push(MockCall {
            text: text.to_string(),
            previous: previous.cloned(),
        });
        let reply = self.replies.lock().pop_front();
        self.started.send_modify(|started| *started += 1);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        match reply {
            Some(MockReply::Result(result)) => Ok(result),
            Some(MockReply::Raw(raw)) => normalize_response(&raw).map(|n| n.result),
            Some(MockReply::Failure(message)) => Err(ExtractError::MalformedResponse(message)),
            None => Ok(ExtractionResult::default()),
        }
    }
}
