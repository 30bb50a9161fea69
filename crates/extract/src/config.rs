use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    pub base_url: String,
    pub model: String,
    /// Sent as a bearer token when set.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Input text beyond this many characters is truncated head+tail.
    pub max_input_chars: usize,
    pub request_timeout_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_input_chars: 12_000,
            request_timeout_secs: 120,
        }
    }
}

impl ExtractorConfig {
    /// Defaults overlaid with `EXTRACTOR_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values looked up by variable name on top of `self`.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("EXTRACTOR_BASE_URL") {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("EXTRACTOR_MODEL") {
            self.model = model;
        }
        if let Some(key) = lookup("EXTRACTOR_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
        parse_into(&lookup, "EXTRACTOR_TEMPERATURE", &mut self.temperature);
        parse_into(&lookup, "EXTRACTOR_MAX_TOKENS", &mut self.max_tokens);
        parse_into(&lookup, "EXTRACTOR_MAX_INPUT_CHARS", &mut self.max_input_chars);
        parse_into(&lookup, "EXTRACTOR_TIMEOUT_SECS", &mut self.request_timeout_secs);
        self
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else { return };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(key, value = %raw, "Ignoring unparsable config value"),
    }
}
