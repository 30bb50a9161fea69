use chrono::{DateTime, Utc};
use extract::ExtractionResult;
use ingest::FileInput;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Time-ordered (UUID v7), unique for the life of the process.
pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Text,
    Document,
    Image,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskKind::Text => "text",
            TaskKind::Document => "document",
            TaskKind::Image => "image",
        })
    }
}

/// Raw input for a task. The variant fixes the task's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum TaskContent {
    Text(String),
    Document(FileInput),
    Image(FileInput),
}

impl TaskContent {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskContent::Text(_) => TaskKind::Text,
            TaskContent::Document(_) => TaskKind::Document,
            TaskContent::Image(_) => TaskKind::Image,
        }
    }
}

/// `Pending -> Processing -> Completed | Failed`, and `Pending | Processing
/// -> Cancelled`. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisTask {
    pub id: TaskId,
    #[serde(flatten)]
    pub content: TaskContent,
    pub timestamp: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisTask {
    pub(crate) fn new(content: TaskContent) -> Self {
        Self {
            id: Uuid::now_v7(),
            content,
            timestamp: Utc::now(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.content.kind()
    }
}
