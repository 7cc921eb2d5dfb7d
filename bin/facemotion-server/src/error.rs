//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! **Security note:** I/O errors are logged with full detail but only a
//! generic message is returned to the caller so that file paths never leak
//! to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use facemotion_core::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the facemotion-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the orchestration core.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::Core(core) => match core {
                // Request-shape problems: expose the message directly.
                CoreError::InvalidParameters(m) => {
                    (StatusCode::BAD_REQUEST, json!({ "error": m }))
                }
                CoreError::InvalidFormat { .. } => {
                    (StatusCode::BAD_REQUEST, json!({ "error": core.to_string() }))
                }
                CoreError::NotReady(id) => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": format!("task {id} is not completed yet") }),
                ),

                CoreError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    json!({ "error": format!("task {id} not found") }),
                ),

                // Conflicts with the task's current state; the stored failure
                // descriptor rides along so clients need no second request.
                CoreError::Failed { id, failure } => (
                    StatusCode::CONFLICT,
                    json!({
                        "error": format!("task {id} failed"),
                        "failure": failure,
                    }),
                ),
                CoreError::NotTerminal { id, state } => (
                    StatusCode::CONFLICT,
                    json!({
                        "error": format!("task {id} is still {state}; cancel it or wait for completion"),
                    }),
                ),

                CoreError::QueueFull { capacity } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "error": format!("submission queue full (capacity {capacity}); retry later"),
                    }),
                ),
                CoreError::Shutdown => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "error": "server is shutting down" }),
                ),

                CoreError::Io(e) => {
                    error!(error = %e, "storage i/o error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "internal server error" }),
                    )
                }
            },

            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),

            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use facemotion_core::{Failure, TaskId};

    #[test]
    fn status_codes_match_error_classes() {
        let cases: Vec<(ServerError, StatusCode)> = vec![
            (
                CoreError::InvalidParameters("invalid size".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::NotFound(TaskId::new()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                CoreError::NotReady(TaskId::new()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                CoreError::Failed {
                    id: TaskId::new(),
                    failure: Failure::cancelled(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::NotTerminal {
                    id: TaskId::new(),
                    state: "processing",
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                CoreError::QueueFull { capacity: 64 }.into(),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (CoreError::Shutdown.into(), StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn io_details_stay_private() {
        let err: ServerError =
            CoreError::Io(std::io::Error::other("disk on fire at /secret/path")).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
