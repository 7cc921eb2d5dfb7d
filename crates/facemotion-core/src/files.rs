use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::types::{ArtifactKind, CoreError, TaskId};

/// Raster formats accepted for the source image.
pub const SUPPORTED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Container/codec formats accepted for the driven audio.
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "aac", "ogg"];

/// Video containers the engine is known to emit.
pub const SUPPORTED_VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "webm"];

/// Maximum accepted source-image size (50 MiB).
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Maximum accepted driven-audio size (100 MiB).
pub const MAX_AUDIO_BYTES: usize = 100 * 1024 * 1024;

/// Task-id-addressed artifact storage.
///
/// Layout under the root, one directory per task id inside each partition so
/// purge is atomic per task:
///
/// ```text
/// <root>/uploads/<task_id>/source.<ext>   input image copy
/// <root>/uploads/<task_id>/audio.<ext>    input audio copy
/// <root>/temp/<task_id>/…                 transient working files
/// <root>/results/<task_id>/…              final rendered video
/// ```
///
/// The store owns byte content only; task metadata lives in the registry.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create, if needed) the storage tree rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let root = root.into();
        for partition in ["uploads", "temp", "results"] {
            tokio::fs::create_dir_all(root.join(partition)).await?;
        }
        info!(root = %root.display(), "file store ready");
        Ok(Self { root })
    }

    /// Directory holding `kind` artifacts for `task`.
    pub fn task_dir(&self, task: TaskId, kind: ArtifactKind) -> PathBuf {
        self.root.join(partition(kind)).join(task.to_string())
    }

    /// Persist uploaded or generated bytes for `task`.
    ///
    /// Validates the declared type (by extension) against the supported set
    /// for `kind` and rejects empty or oversized content with
    /// [`CoreError::InvalidFormat`].  Inputs are stored under a fixed stem so
    /// [`Self::resolve`] can find them without extra bookkeeping.
    pub async fn save(
        &self,
        task: TaskId,
        kind: ArtifactKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, CoreError> {
        let label = kind_label(kind);
        let extension = validate_format(kind, filename)?;

        if bytes.is_empty() {
            return Err(CoreError::InvalidFormat {
                kind: label,
                detail: "file is empty".to_owned(),
            });
        }
        if let Some(max) = size_cap(kind) {
            if bytes.len() > max {
                return Err(CoreError::InvalidFormat {
                    kind: label,
                    detail: format!("file too large ({} bytes; maximum is {max} bytes)", bytes.len()),
                });
            }
        }

        let dir = self.task_dir(task, kind);
        tokio::fs::create_dir_all(&dir).await?;

        let name = match stem(kind) {
            Some(stem) => format!("{stem}.{extension}"),
            None => sanitize_filename(filename),
        };
        let path = dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        debug!(task_id = %task, path = %path.display(), size = bytes.len(), "artifact saved");
        Ok(path)
    }

    /// Resolve the stored path of a `kind` artifact, if one exists on disk.
    pub async fn resolve(&self, task: TaskId, kind: ArtifactKind) -> Option<PathBuf> {
        let dir = self.task_dir(task, kind);
        let mut entries = tokio::fs::read_dir(&dir).await.ok()?;
        let wanted_stem = stem(kind);
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match wanted_stem {
                Some(stem) => {
                    if path.file_stem().and_then(|s| s.to_str()) == Some(stem) {
                        return Some(path);
                    }
                }
                None => return Some(path),
            }
        }
        None
    }

    /// Delete every artifact for `task`, across all partitions.
    ///
    /// Idempotent: purging a task that has nothing on disk is a no-op.  The
    /// store never initiates this itself; the task manager calls it once the
    /// task is terminal.
    pub async fn purge(&self, task: TaskId) -> Result<(), CoreError> {
        for kind in [
            ArtifactKind::SourceImage,
            ArtifactKind::Intermediate,
            ArtifactKind::Output,
        ] {
            let dir = self.task_dir(task, kind);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => debug!(task_id = %task, dir = %dir.display(), "artifacts purged"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(task_id = %task, dir = %dir.display(), error = %e, "purge failed");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn partition(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::SourceImage | ArtifactKind::DrivenAudio => "uploads",
        ArtifactKind::Intermediate => "temp",
        ArtifactKind::Output => "results",
    }
}

fn stem(kind: ArtifactKind) -> Option<&'static str> {
    match kind {
        ArtifactKind::SourceImage => Some("source"),
        ArtifactKind::DrivenAudio => Some("audio"),
        ArtifactKind::Intermediate | ArtifactKind::Output => None,
    }
}

fn kind_label(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::SourceImage => "image",
        ArtifactKind::DrivenAudio => "audio",
        ArtifactKind::Intermediate => "intermediate",
        ArtifactKind::Output => "video",
    }
}

fn size_cap(kind: ArtifactKind) -> Option<usize> {
    match kind {
        ArtifactKind::SourceImage => Some(MAX_IMAGE_BYTES),
        ArtifactKind::DrivenAudio => Some(MAX_AUDIO_BYTES),
        ArtifactKind::Intermediate | ArtifactKind::Output => None,
    }
}

/// Check the declared file type against the supported set for `kind` and
/// return the (lowercased) extension.
fn validate_format(kind: ArtifactKind, filename: &str) -> Result<String, CoreError> {
    let label = kind_label(kind);
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| CoreError::InvalidFormat {
            kind: label,
            detail: format!("'{filename}' has no file extension"),
        })?;

    let allowed: &[&str] = match kind {
        ArtifactKind::SourceImage => SUPPORTED_IMAGE_EXTENSIONS,
        ArtifactKind::DrivenAudio => SUPPORTED_AUDIO_EXTENSIONS,
        ArtifactKind::Output => SUPPORTED_VIDEO_EXTENSIONS,
        // Working files are engine-internal; anything goes.
        ArtifactKind::Intermediate => return Ok(extension),
    };

    if allowed.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(CoreError::InvalidFormat {
            kind: label,
            detail: format!("unsupported format '.{extension}' (supported: {})", allowed.join(", ")),
        })
    }
}

/// Strip path components and shell-hostile characters from a client-supplied
/// filename.
fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed_file");

    let mut cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\\' | '/' => '_',
            other => other,
        })
        .collect();
    cleaned = cleaned.trim_matches([' ', '.']).to_owned();

    if cleaned.is_empty() {
        cleaned = "unnamed_file".to_owned();
    }
    if cleaned.len() > 255 {
        cleaned.truncate(255);
    }
    cleaned
}

// ─── Tests ────────────────────────────────────────────────────────────────────
