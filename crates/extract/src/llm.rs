use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::minify::minify;
use crate::normalizer::normalize_response;
use crate::prompt::build_extraction_prompt;
use crate::schema::ExtractionResult;

/// The external extraction service: text plus optional prior context in,
/// normalized entities and relationships out.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn extract(
        &self,
        text: &str,
        previous: Option<&ExtractionResult>,
    ) -> Result<ExtractionResult>;
}

#[derive(Clone)]
pub struct LlmClient {
    config: ExtractorConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str, // "json" for structured output
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl LlmClient {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub async fn generate(&self, prompt: String) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);

        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Status { status, body });
        }

        let generated: GenerateResponse = response.json().await?;
        if generated.response.trim().is_empty() {
            return Err(ExtractError::EmptyResponse);
        }

        Ok(generated.response)
    }
}

#[async_trait]
impl ExtractionBackend for LlmClient {
    async fn extract(
        &self,
        text: &str,
        previous: Option<&ExtractionResult>,
    ) -> Result<ExtractionResult> {
        let text = minify(text, self.config.max_input_chars);
        let prompt = build_extraction_prompt(&text, previous);

        debug!(
            model = %self.config.model,
            input_chars = text.chars().count(),
            prior_entities = previous.map_or(0, |p| p.entities.len()),
            "Requesting extraction"
        );

        let raw = self.generate(prompt).await?;
        let normalized = normalize_response(&raw)?;

        for diagnostic in &normalized.diagnostics {
            warn!(%diagnostic, "Extraction response normalized");
        }

        Ok(normalized.result)
    }
}
