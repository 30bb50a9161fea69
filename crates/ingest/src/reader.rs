use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

pub struct FileReader;

impl FileReader {
    /// Whether the file's extension is one we can read as plain text.
    pub fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    pub async fn read_file(path: &Path) -> Result<String> {
        if !Self::is_supported(path) {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let content = fs::read_to_string(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;
        Ok(content)
    }
}
