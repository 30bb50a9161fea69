pub mod reader;

pub use reader::FileReader;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file handed in for analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInput {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.to_string_lossy().to_string())
    }
}

/// Text for a document: its content when readable as text, otherwise a
/// description built from the file name.
pub async fn document_text(file: &FileInput) -> Result<String> {
    if FileReader::is_supported(&file.path) && is_file(&file.path).await {
        return FileReader::read_file(&file.path).await;
    }
    Ok(document_placeholder(file))
}

pub fn document_placeholder(file: &FileInput) -> String {
    format!(
        "Document \"{}\"{}. Its text could not be extracted; identify any entities suggested by the document name.",
        file.file_name(),
        mime_suffix(file)
    )
}

pub fn image_text(file: &FileInput) -> String {
    format!(
        "Image \"{}\"{}. Its content could not be read; identify any entities suggested by the image name.",
        file.file_name(),
        mime_suffix(file)
    )
}

fn mime_suffix(file: &FileInput) -> String {
    file.mime_type
        .as_deref()
        .map(|m| format!(" ({})", m))
        .unwrap_or_default()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
