use async_trait::async_trait;
use extract::ExtractionResult;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::task::{AnalysisTask, TaskKind};

/// Processes one task on behalf of the queue.
///
/// `previous` is a copy of the cumulative context taken when the task was
/// dequeued. The returned result is stored on the task and merged by the
/// queue; handlers never touch task status.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &AnalysisTask, previous: ExtractionResult)
        -> Result<ExtractionResult>;
}

/// Per-kind handler dispatch, fixed when the queue is built.
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: TaskKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: TaskKind) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&kind)
    }
}
