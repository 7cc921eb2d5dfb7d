//! Wire-format response bodies.

use chrono::{DateTime, Utc};
use facemotion_core::{Failure, FailureKind, TaskSnapshot, TaskState};
use serde::Serialize;
use utoipa::ToSchema;

/// Multipart form for `POST /api/v1/generate` (documentation only; the
/// handler reads the fields directly off the multipart stream).
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct GenerateRequest {
    /// Face photo: jpg, jpeg, png, bmp, tiff or webp.
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub source_image: String,
    /// Driving speech: wav, mp3, m4a, flac, aac or ogg.
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub driven_audio: String,
    /// crop | resize | full | extcrop | extfull (default: crop).
    pub preprocess: Option<String>,
    pub still_mode: Option<bool>,
    pub use_enhancer: Option<bool>,
    /// 1-10 (default: 2).
    pub batch_size: Option<u32>,
    /// 256 or 512 (default: 256).
    pub size: Option<u32>,
    /// 0-46 (default: 0).
    pub pose_style: Option<u32>,
    /// 0.1-3.0 (default: 1.0).
    pub expression_scale: Option<f32>,
}

/// Body of `POST /api/v1/generate`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub task_id: String,
    pub status: String,
    pub message: String,
}

/// Stored failure descriptor, as exposed to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct FailureBody {
    /// One of `input_unavailable`, `engine_failure`, `timeout`, `cancelled`.
    pub kind: String,
    pub message: String,
}

impl From<&Failure> for FailureBody {
    fn from(failure: &Failure) -> Self {
        let kind = match failure.kind {
            FailureKind::InputUnavailable => "input_unavailable",
            FailureKind::EngineFailure => "engine_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        Self {
            kind: kind.to_owned(),
            message: failure.message.clone(),
        }
    }
}

/// Body of `GET /api/v1/status/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// `queued`, `processing`, `completed` or `failed`.
    pub status: String,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
    /// Present once the task completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Present once the task failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureBody>,
}

impl TaskStatusResponse {
    pub fn from_snapshot(snapshot: &TaskSnapshot) -> Self {
        let id = snapshot.id.to_string();
        let (message, download_url, error) = match &snapshot.state {
            TaskState::Queued => ("Task is queued for processing".to_owned(), None, None),
            TaskState::Processing => ("Task is being processed".to_owned(), None, None),
            TaskState::Completed { .. } => (
                "Task completed successfully".to_owned(),
                Some(format!("/api/v1/download/{id}")),
                None,
            ),
            TaskState::Failed { failure } => (
                failure.to_string(),
                None,
                Some(FailureBody::from(failure)),
            ),
        };
        Self {
            task_id: id,
            status: snapshot.state.as_str().to_owned(),
            message,
            created_at: snapshot.created_at.to_rfc3339(),
            updated_at: snapshot.updated_at.to_rfc3339(),
            download_url,
            error,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub gpu_available: bool,
    pub version: String,
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use facemotion_core::TaskId;

    fn snapshot(state: TaskState) -> TaskSnapshot {
        let now = Utc::now();
        TaskSnapshot {
            id: TaskId::new(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn completed_tasks_expose_a_download_url() {
        let snap = snapshot(TaskState::Completed {
            video: "result.mp4".into(),
        });
        let body = TaskStatusResponse::from_snapshot(&snap);
        assert_eq!(body.status, "completed");
        assert_eq!(
            body.download_url,
            Some(format!("/api/v1/download/{}", snap.id))
        );
        assert!(body.error.is_none());
    }

    #[test]
    fn failed_tasks_expose_the_stored_descriptor() {
        let snap = snapshot(TaskState::Failed {
            failure: Failure::engine("no face is detected"),
        });
        let body = TaskStatusResponse::from_snapshot(&snap);
        assert_eq!(body.status, "failed");
        assert!(body.download_url.is_none());
        let error = body.error.expect("descriptor present");
        assert_eq!(error.kind, "engine_failure");
        assert!(error.message.contains("no face"));
    }

    #[test]
    fn queued_tasks_expose_neither() {
        let body = TaskStatusResponse::from_snapshot(&snapshot(TaskState::Queued));
        assert_eq!(body.status, "queued");
        assert!(body.download_url.is_none());
        assert!(body.error.is_none());
    }
}
