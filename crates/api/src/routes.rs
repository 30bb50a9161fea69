use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use extract::ExtractionResult;
use ingest::FileInput;
use queue::{AnalysisError, AnalysisQueue, AnalysisTask, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub queue: AnalysisQueue,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    processing: bool,
}

#[derive(Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Deserialize)]
struct FileRequest {
    path: String,
    #[serde(default)]
    mime_type: Option<String>,
}

impl FileRequest {
    fn into_input(self) -> FileInput {
        let input = FileInput::new(self.path);
        match self.mime_type {
            Some(mime) => input.with_mime_type(mime),
            None => input,
        }
    }
}

#[derive(Serialize)]
struct QueuedResponse {
    task_id: TaskId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub entities: usize,
    pub relationships: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", get(list_tasks))
        .route("/tasks/text", post(queue_text))
        .route("/tasks/document", post(queue_document))
        .route("/tasks/image", post(queue_image))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/cancel", post(cancel_task))
        .route("/results", get(get_results).delete(reset_results))
        .route("/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        processing: state.queue.is_processing(),
    })
}

async fn queue_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> (StatusCode, Json<QueuedResponse>) {
    let task_id = state.queue.queue_text_analysis(req.text);
    (StatusCode::ACCEPTED, Json(QueuedResponse { task_id }))
}

async fn queue_document(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> (StatusCode, Json<QueuedResponse>) {
    let task_id = state.queue.queue_document_analysis(req.into_input());
    (StatusCode::ACCEPTED, Json(QueuedResponse { task_id }))
}

async fn queue_image(
    State(state): State<AppState>,
    Json(req): Json<FileRequest>,
) -> (StatusCode, Json<QueuedResponse>) {
    let task_id = state.queue.queue_image_analysis(req.into_input());
    (StatusCode::ACCEPTED, Json(QueuedResponse { task_id }))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<AnalysisTask>> {
    Json(state.queue.get_tasks())
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> Result<Json<AnalysisTask>, StatusCode> {
    state
        .queue
        .get_task(id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> StatusCode {
    match state.queue.cancel_task(id) {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(AnalysisError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
        Err(AnalysisError::TaskFinished { .. }) => StatusCode::CONFLICT,
        Err(e) => {
            tracing::error!(task_id = %id, error = %e, "Cancel failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn get_results(State(state): State<AppState>) -> Json<ExtractionResult> {
    Json(state.queue.get_previous_results())
}

async fn reset_results(State(state): State<AppState>) -> StatusCode {
    state.queue.reset_previous_results();
    StatusCode::NO_CONTENT
}

async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let mut stats = StatsResponse::default();
    for task in state.queue.get_tasks() {
        match task.status {
            TaskStatus::Pending => stats.pending += 1,
            TaskStatus::Processing => stats.processing += 1,
            TaskStatus::Completed => stats.completed += 1,
            TaskStatus::Failed => stats.failed += 1,
            TaskStatus::Cancelled => stats.cancelled += 1,
        }
    }

    let context = state.queue.get_previous_results();
    stats.entities = context.entities.len();
    stats.relationships = context.relationships.len();
    Json(stats)
}
