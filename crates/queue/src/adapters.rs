use async_trait::async_trait;
use extract::{ExtractionBackend, ExtractionResult};
use ingest::FileInput;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::handler::{HandlerMap, TaskHandler};
use crate::service::AnalysisQueue;
use crate::task::{AnalysisTask, TaskContent, TaskId, TaskKind};

impl AnalysisQueue {
    pub fn queue_text_analysis(&self, text: impl Into<String>) -> TaskId {
        self.add_task(TaskContent::Text(text.into()))
    }

    pub fn queue_document_analysis(&self, file: FileInput) -> TaskId {
        self.add_task(TaskContent::Document(file))
    }

    pub fn queue_image_analysis(&self, file: FileInput) -> TaskId {
        self.add_task(TaskContent::Image(file))
    }
}

/// Handlers for every task kind, all backed by `backend`.
pub fn default_handlers(backend: Arc<dyn ExtractionBackend>) -> HandlerMap {
    let text = TextAdapter::new(backend);
    HandlerMap::new()
        .with(TaskKind::Document, Arc::new(DocumentAdapter::new(text.clone())))
        .with(TaskKind::Image, Arc::new(ImageAdapter::new(text.clone())))
        .with(TaskKind::Text, Arc::new(text))
}

fn unsupported(expected: TaskKind, task: &AnalysisTask) -> AnalysisError {
    AnalysisError::UnsupportedTaskType {
        expected,
        actual: task.kind(),
    }
}

#[derive(Clone)]
pub struct TextAdapter {
    backend: Arc<dyn ExtractionBackend>,
}

impl TextAdapter {
    pub fn new(backend: Arc<dyn ExtractionBackend>) -> Self {
        Self { backend }
    }

    pub async fn process_text_analysis(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        let TaskContent::Text(text) = &task.content else {
            return Err(unsupported(TaskKind::Text, task));
        };
        self.analyze(task.id, text, previous).await
    }

    async fn analyze(
        &self,
        task_id: TaskId,
        text: &str,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        let prior = (!previous.is_empty()).then_some(&previous);
        let result = self.backend.extract(text, prior).await?;

        debug!(
            task_id = %task_id,
            prior_entities = previous.entities.len(),
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            "Backend extraction returned"
        );
        Ok(result)
    }
}

#[async_trait]
impl TaskHandler for TextAdapter {
    async fn handle(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        self.process_text_analysis(task, previous).await
    }
}

pub struct DocumentAdapter {
    text: TextAdapter,
}

impl DocumentAdapter {
    pub fn new(text: TextAdapter) -> Self {
        Self { text }
    }

    pub async fn process_document_analysis(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        let TaskContent::Document(file) = &task.content else {
            return Err(unsupported(TaskKind::Document, task));
        };

        let text = ingest::document_text(file)
            .await
            .map_err(|e| AnalysisError::Input(format!("{:#}", e)))?;
        self.text.analyze(task.id, &text, previous).await
    }
}

#[async_trait]
impl TaskHandler for DocumentAdapter {
    async fn handle(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        self.process_document_analysis(task, previous).await
    }
}

pub struct ImageAdapter {
    text: TextAdapter,
}

impl ImageAdapter {
    pub fn new(text: TextAdapter) -> Self {
        Self { text }
    }

    pub async fn process_image_analysis(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        let TaskContent::Image(file) = &task.content else {
            return Err(unsupported(TaskKind::Image, task));
        };

        let text = ingest::image_text(file);
        self.text.analyze(task.id, &text, previous).await
    }
}

#[async_trait]
impl TaskHandler for ImageAdapter {
    async fn handle(
        &self,
        task: &AnalysisTask,
        previous: ExtractionResult,
    ) -> Result<ExtractionResult> {
        self.process_image_analysis(task, previous).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::testing::MockBackend;

    fn text_task(text: &str) -> AnalysisTask {
        AnalysisTask::new(TaskContent::Text(text.to_string()))
    }

    #[tokio::test]
    async fn test_wrong_kind_is_rejected() {
        let backend = MockBackend::new();
        let text = TextAdapter::new(Arc::new(backend.clone()));
        let image = ImageAdapter::new(text.clone());

        let err = image
            .process_image_analysis(&text_task("Alice"), ExtractionResult::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::UnsupportedTaskType {
                expected: TaskKind::Image,
                actual: TaskKind::Text
            }
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_context_is_not_sent() {
        let backend = MockBackend::new();
        let text = TextAdapter::new(Arc::new(backend.clone()));

        text.process_text_analysis(&text_task("Alice"), ExtractionResult::default())
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].text, "Alice");
        assert!(calls[0].previous.is_none());
    }

    #[tokio::test]
    async fn test_document_and_image_use_text_pathway() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.md");
        std::fs::write(&notes, "Alice met Bob in Paris.").unwrap();

        let backend = MockBackend::new();
        let text = TextAdapter::new(Arc::new(backend.clone()));
        let document = DocumentAdapter::new(text.clone());
        let image = ImageAdapter::new(text);

        let doc_task = AnalysisTask::new(TaskContent::Document(FileInput::new(&notes)));
        document
            .process_document_analysis(&doc_task, ExtractionResult::default())
            .await
            .unwrap();

        let image_task = AnalysisTask::new(TaskContent::Image(FileInput::new("eiffel.jpg")));
        image
            .process_image_analysis(&image_task, ExtractionResult::default())
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0].text, "Alice met Bob in Paris.");
        assert!(calls[1].text.contains("eiffel.jpg"));
    }
}
