mod config;
mod routes;

use anyhow::Context;
use extract::LlmClient;
use queue::AnalysisQueue;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    tracing::info!(
        base_url = %config.extractor.base_url,
        model = %config.extractor.model,
        "Using extraction backend"
    );

    let client = LlmClient::new(config.extractor.clone())
        .context("Failed to build extraction client")?;

    // One queue for the whole process.
    let queue = AnalysisQueue::with_backend(Arc::new(client));
    queue
        .on_task_completed(|task| {
            let (entities, relationships) = task
                .result
                .as_ref()
                .map_or((0, 0), |r| (r.entities.len(), r.relationships.len()));
            tracing::info!(task_id = %task.id, entities, relationships, "Extraction merged");
        })
        .detach();

    let app = router(AppState { queue });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
