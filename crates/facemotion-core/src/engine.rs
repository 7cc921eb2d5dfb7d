use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Failure, GenerationParams};

/// Failure modes of the external synthesis engine, normalized from whatever
/// it actually reports.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The accelerator ran out of memory mid-render.
    #[error("engine out of memory: {0}")]
    OutOfMemory(String),

    /// The engine could not make sense of the input media (e.g. no face
    /// detected in the source image).
    #[error("malformed input media: {0}")]
    MalformedInput(String),

    /// The engine process could not start or load its model state.
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Anything else the engine reported.
    #[error("synthesis failed: {0}")]
    Other(String),
}

impl EngineError {
    /// Collapse into the task-level error descriptor.  Every engine failure
    /// is terminal for its task; the message is kept for diagnostics but not
    /// assumed machine-actionable.
    pub fn into_failure(self) -> Failure {
        Failure::engine(self.to_string())
    }
}

/// Boundary to the external video-synthesis engine.
///
/// One call renders one video: seconds to many minutes, no progress
/// reporting, no cancellation hook.  Implementations must confine themselves
/// to `result_dir` for output and normalize their failures into
/// [`EngineError`]; retry policy is the caller's problem (there is none — a
/// failed task stays failed).
#[async_trait]
pub trait SynthesisEngine: Send + Sync + 'static {
    async fn synthesize(
        &self,
        image: &Path,
        audio: &Path,
        params: &GenerationParams,
        result_dir: &Path,
    ) -> Result<PathBuf, EngineError>;

    /// Whether the accelerator the engine depends on is currently usable.
    /// Consumed by the health probe only, never by the orchestration core.
    fn accelerator_available(&self) -> bool;
}

/// Adapter that shells out to an external synthesis command.
///
/// The command is expected to print the path of the rendered video as the
/// last line of stdout and exit non-zero on failure, which is how the
/// upstream SadTalker CLI behaves.
pub struct ProcessEngine {
    program: String,
    gpu_available: bool,
}

impl ProcessEngine {
    /// Probe the accelerator once at construction; a lost device after that
    /// shows up as per-task engine failures rather than flipping the health
    /// probe mid-flight.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let gpu_available = probe_accelerator();
        info!(%program, gpu_available, "process engine configured");
        Self {
            program,
            gpu_available,
        }
    }
}

#[async_trait]
impl SynthesisEngine for ProcessEngine {
    async fn synthesize(
        &self,
        image: &Path,
        audio: &Path,
        params: &GenerationParams,
        result_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("--source_image")
            .arg(image)
            .arg("--driven_audio")
            .arg(audio)
            .arg("--preprocess")
            .arg(params.preprocess.as_str())
            .arg("--batch_size")
            .arg(params.batch_size.to_string())
            .arg("--size")
            .arg(params.size.to_string())
            .arg("--pose_style")
            .arg(params.pose_style.to_string())
            .arg("--expression_scale")
            .arg(params.expression_scale.to_string())
            .arg("--result_dir")
            .arg(result_dir);
        if params.still_mode {
            command.arg("--still");
        }
        if params.use_enhancer {
            command.arg("--enhancer").arg("gfpgan");
        }

        debug!(program = %self.program, image = %image.display(), audio = %audio.display(), "invoking synthesis engine");

        let output = command.output().await.map_err(|e| {
            EngineError::Unavailable(format!("failed to spawn '{}': {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "synthesis engine failed");
            return Err(classify_failure(&stderr, output.status.code()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reported = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                EngineError::Other("engine exited successfully but reported no output path".to_owned())
            })?;

        if !reported.is_file() {
            return Err(EngineError::Other(format!(
                "engine reported '{}' but no such file exists",
                reported.display()
            )));
        }
        Ok(reported)
    }

    fn accelerator_available(&self) -> bool {
        self.gpu_available
    }
}

/// Map the engine's stderr onto the normalized failure modes.
fn classify_failure(stderr: &str, exit_code: Option<i32>) -> EngineError {
    let lowered = stderr.to_lowercase();
    let summary = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
        .to_owned();

    if lowered.contains("out of memory") || lowered.contains("cuda error") {
        EngineError::OutOfMemory(summary)
    } else if lowered.contains("no face") || lowered.contains("invalid input") {
        EngineError::MalformedInput(summary)
    } else if lowered.contains("checkpoint") || lowered.contains("model") {
        EngineError::Unavailable(summary)
    } else {
        EngineError::Other(match exit_code {
            Some(code) => format!("exit code {code}: {summary}"),
            None => format!("killed by signal: {summary}"),
        })
    }
}

/// Best-effort accelerator probe via `nvidia-smi`; absence of the tool means
/// CPU-only operation, which is still a valid (slow) deployment.
fn probe_accelerator() -> bool {
    std::process::Command::new("nvidia-smi")
        .arg("-L")
        .output()
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn oom_is_classified() {
        let err = classify_failure("RuntimeError: CUDA out of memory. Tried to allocate…", Some(1));
        assert!(matches!(err, EngineError::OutOfMemory(_)));
    }

    #[test]
    fn missing_face_is_malformed_input() {
        let err = classify_failure("Error: no face is detected in the source image", Some(1));
        assert!(matches!(err, EngineError::MalformedInput(_)));
    }

    #[test]
    fn missing_checkpoint_is_unavailable() {
        let err = classify_failure("FileNotFoundError: checkpoint dir not found", Some(1));
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[test]
    fn unknown_failures_keep_the_exit_code() {
        let err = classify_failure("something odd happened", Some(137));
        match err {
            EngineError::Other(msg) => assert!(msg.contains("137")),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn failures_normalize_into_engine_failure() {
        let failure = EngineError::OutOfMemory("8 GiB requested".to_owned()).into_failure();
        assert_eq!(failure.kind, crate::types::FailureKind::EngineFailure);
        assert!(failure.message.contains("out of memory"));
    }
}
