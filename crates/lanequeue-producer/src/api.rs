use crate::dispatcher::{DispatchError, DispatchedBatch, Dispatcher};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lanequeue_core::{SubmissionValidator, Task, ValidationError};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared handler state, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub validator: SubmissionValidator,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, validator: SubmissionValidator) -> Self {
        AppState {
            dispatcher,
            validator,
        }
    }
}

/// HTTP ingress routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task))
        .route("/batch-tasks", post(create_batch_tasks))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task: Task,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Accept one task. An unknown priority is logged and the task is published
/// with priority 0, unless the validator is strict.
async fn create_task(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TaskResponse>, ApiError> {
    let submission = state
        .validator
        .decode_task(&body)
        .map_err(ApiError::InvalidTask)?;

    if let Some(warning) = &submission.warning {
        warn!(
            title = %submission.task.title,
            priority = submission.task.delivery_priority(),
            "Accepting task despite: {}", warning
        );
    }

    let task = state.dispatcher.dispatch_task(submission.task).await?;
    Ok(Json(TaskResponse { task }))
}

/// Accept a batch. Any invalid member rejects the whole submission.
async fn create_batch_tasks(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DispatchedBatch>, ApiError> {
    let batch = state
        .validator
        .decode_batch(&body)
        .map_err(ApiError::InvalidBatch)?;

    let dispatched = state.dispatcher.dispatch_batch(batch).await?;
    Ok(Json(dispatched))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidTask(ValidationError),

    #[error("Invalid payload: {0}")]
    InvalidBatch(ValidationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidTask(_) | ApiError::InvalidBatch(_) => StatusCode::BAD_REQUEST,
            ApiError::Dispatch(DispatchError::Publish(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Dispatch(DispatchError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
