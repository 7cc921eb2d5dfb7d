//! Task polling, download, and lifecycle endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use facemotion_core::{CoreError, TaskId};
use tokio_util::io::ReaderStream;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::{FailureBody, TaskStatusResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_status, download, cancel_task, delete_task),
    components(schemas(TaskStatusResponse, FailureBody))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status/{id}", get(get_status))
        .route("/download/{id}", get(download))
        .route("/tasks/{id}/cancel", post(cancel_task))
        .route("/tasks/{id}", delete(delete_task))
}

fn parse_id(raw: &str) -> Result<TaskId, ServerError> {
    raw.parse()
        .map_err(|_| ServerError::BadRequest(format!("invalid task id '{raw}'")))
}

/// Poll a task (`GET /api/v1/status/{id}`).
///
/// Pure read: never blocks on, or advances, task execution.
#[utoipa::path(
    get,
    path = "/api/v1/status/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id returned by /generate")),
    responses(
        (status = 200, description = "Current task state", body = TaskStatusResponse),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let snapshot = state.manager.status(parse_id(&id)?).await?;
    Ok(Json(TaskStatusResponse::from_snapshot(&snapshot)))
}

/// Fetch the rendered video (`GET /api/v1/download/{id}`).
///
/// Streams the file; available only once the task completed.
#[utoipa::path(
    get,
    path = "/api/v1/download/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id returned by /generate")),
    responses(
        (status = 200, description = "Rendered video", body = Vec<u8>, content_type = "video/mp4"),
        (status = 400, description = "Task not completed yet"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task failed; body carries the stored descriptor"),
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ServerError> {
    let id = parse_id(&id)?;
    let video = state.manager.artifact(id).await?;

    let file = tokio::fs::File::open(&video)
        .await
        .map_err(|e| ServerError::Core(CoreError::Io(e)))?;
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"facemotion_result_{id}.mp4\""),
        )
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Cancel a task (`POST /api/v1/tasks/{id}/cancel`).
///
/// Best-effort and idempotent: a queued task fails immediately and never
/// reaches the engine; a processing task is marked failed and its eventual
/// result discarded; a terminal task is returned unchanged.
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/cancel",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id returned by /generate")),
    responses(
        (status = 200, description = "Task state after cancellation", body = TaskStatusResponse),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ServerError> {
    let snapshot = state.manager.cancel(parse_id(&id)?).await?;
    Ok(Json(TaskStatusResponse::from_snapshot(&snapshot)))
}

/// Purge a terminal task (`DELETE /api/v1/tasks/{id}`).
///
/// Removes the record and every stored artifact.  Non-terminal tasks are
/// refused; cancel first.
#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task id returned by /generate")),
    responses(
        (status = 200, description = "Task purged"),
        (status = 404, description = "Task not found"),
        (status = 409, description = "Task is not terminal"),
    )
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let id = parse_id(&id)?;
    state.manager.delete(id).await?;
    Ok(Json(serde_json::json!({
        "task_id": id.to_string(),
        "status": "deleted",
    })))
}
