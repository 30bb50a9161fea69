pub mod config;
pub mod error;
pub mod llm;
pub mod merge;
pub mod minify;
pub mod normalizer;
pub mod prompt;
pub mod schema;
pub mod testing;

pub use config::ExtractorConfig;
pub use error::ExtractError;
pub use llm::{ExtractionBackend, LlmClient};
pub use merge::merge;
pub use normalizer::{Diagnostic, NormalizedResponse, entity_id, normalize_response, relationship_id};
pub use schema::{Entity, EntityType, ExtractionResult, Relationship};
