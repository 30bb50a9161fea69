use thiserror::Error;

/// Errors from one call to the extraction backend.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("backend returned an empty response")]
    EmptyResponse,

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("backend response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
