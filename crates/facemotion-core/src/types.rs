use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a submitted synthesis task.
///
/// Assigned once at creation and never reused; the inner UUID is the value
/// clients poll with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ─── Generation parameters ────────────────────────────────────────────────────

/// Face-preprocessing mode passed through to the synthesis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preprocess {
    Crop,
    Resize,
    Full,
    ExtCrop,
    ExtFull,
}

impl Preprocess {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preprocess::Crop => "crop",
            Preprocess::Resize => "resize",
            Preprocess::Full => "full",
            Preprocess::ExtCrop => "extcrop",
            Preprocess::ExtFull => "extfull",
        }
    }
}

impl FromStr for Preprocess {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crop" => Ok(Preprocess::Crop),
            "resize" => Ok(Preprocess::Resize),
            "full" => Ok(Preprocess::Full),
            "extcrop" => Ok(Preprocess::ExtCrop),
            "extfull" => Ok(Preprocess::ExtFull),
            other => Err(CoreError::InvalidParameters(format!(
                "invalid preprocess method: {other} (must be one of crop, resize, full, extcrop, extfull)"
            ))),
        }
    }
}

/// Parameter set for one synthesis run.
///
/// Defaults match the upstream engine's defaults; [`Self::validate`] enforces
/// the declared domain of every numeric field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub preprocess: Preprocess,
    pub still_mode: bool,
    pub use_enhancer: bool,
    pub batch_size: u32,
    pub size: u32,
    pub pose_style: u32,
    pub expression_scale: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            preprocess: Preprocess::Crop,
            still_mode: false,
            use_enhancer: false,
            batch_size: 2,
            size: 256,
            pose_style: 0,
            expression_scale: 1.0,
        }
    }
}

impl GenerationParams {
    /// Check every field against its declared domain.
    ///
    /// Request-time only: a parameter set that fails here never creates a
    /// task.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=10).contains(&self.batch_size) {
            return Err(CoreError::InvalidParameters(format!(
                "invalid batch_size: {} (must be 1-10)",
                self.batch_size
            )));
        }
        if self.size != 256 && self.size != 512 {
            return Err(CoreError::InvalidParameters(format!(
                "invalid size: {} (must be 256 or 512)",
                self.size
            )));
        }
        if self.pose_style > 46 {
            return Err(CoreError::InvalidParameters(format!(
                "invalid pose_style: {} (must be 0-46)",
                self.pose_style
            )));
        }
        if !(0.1..=3.0).contains(&self.expression_scale) {
            return Err(CoreError::InvalidParameters(format!(
                "invalid expression_scale: {} (must be 0.1-3.0)",
                self.expression_scale
            )));
        }
        Ok(())
    }
}

// ─── Task state machine ───────────────────────────────────────────────────────

/// Why a task ended up in [`TaskState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A referenced input file was missing or unreadable at admission time.
    InputUnavailable,
    /// The synthesis engine returned an error.
    EngineFailure,
    /// Processing exceeded the configured wall-clock ceiling.
    Timeout,
    /// The task was cancelled by the caller.
    Cancelled,
}

/// Structured error descriptor recorded on a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn input_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::InputUnavailable,
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::EngineFailure,
            message: message.into(),
        }
    }

    pub fn timeout(ceiling: std::time::Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!(
                "processing exceeded the {} s ceiling; the worker may still be running and its result will be discarded",
                ceiling.as_secs()
            ),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "task cancelled by caller".to_owned(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::InputUnavailable => "input unavailable",
            FailureKind::EngineFailure => "engine failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        };
        write!(f, "{kind}: {}", self.message)
    }
}

/// Lifecycle state of a task.
///
/// Transitions are strictly forward: `Queued → Processing → {Completed |
/// Failed}`, with `Queued → Failed` reachable directly via cancellation or
/// admission-time validation.  Terminal states are permanent; the registry's
/// transition guards reject any write after one is recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Queued,
    Processing,
    Completed { video: PathBuf },
    Failed { failure: Failure },
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Completed { .. } => "completed",
            TaskState::Failed { .. } => "failed",
        }
    }
}

/// Point-in-time copy of a task's observable state.
///
/// Returned by status queries; reading one never blocks a state transition.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Artifacts ────────────────────────────────────────────────────────────────

/// The kinds of files the store tracks for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    SourceImage,
    DrivenAudio,
    /// Transient working files produced mid-synthesis.
    Intermediate,
    /// The final rendered video.
    Output,
}

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Errors surfaced by the orchestration core.
///
/// Request-time variants (`InvalidParameters`, `InvalidFormat`, `QueueFull`)
/// never create a task; everything execution-time is recorded as a
/// [`Failure`] on the task instead and only observed through `Failed`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A parameter is outside its declared domain.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Uploaded content does not match the supported format set.
    #[error("invalid {kind} file: {detail}")]
    InvalidFormat { kind: &'static str, detail: String },

    /// The referenced task does not exist.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The artifact was requested before the task completed.
    #[error("task {0} is not completed yet")]
    NotReady(TaskId),

    /// The task reached `Failed`; carries the stored error descriptor.
    #[error("task {id} failed: {failure}")]
    Failed { id: TaskId, failure: Failure },

    /// The operation requires a terminal task.
    #[error("task {id} is not in a terminal state (state: {state})")]
    NotTerminal { id: TaskId, state: &'static str },

    /// The submission queue is at capacity.
    #[error("submission queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The dispatch loop has shut down.
    #[error("orchestration runtime shut down")]
    Shutdown,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Tests ────────────────────────────────────────────────────────────────────
