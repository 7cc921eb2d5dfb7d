//! Synthesis submission route – async task pattern.
//!
//! Accepts the source image and driven audio via multipart/form-data plus
//! optional generation parameters as plain text fields, creates a task, and
//! returns its id immediately.  Poll `GET /api/v1/status/{id}` for progress
//! and fetch the video from `GET /api/v1/download/{id}` once completed.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use facemotion_core::files::{MAX_AUDIO_BYTES, MAX_IMAGE_BYTES};
use facemotion_core::{GenerationParams, Upload};
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::{GenerateRequest, GenerateResponse};
use crate::state::AppState;

/// Both inputs at their caps plus multipart framing overhead.
const MAX_REQUEST_BYTES: usize = MAX_IMAGE_BYTES + MAX_AUDIO_BYTES + 1024 * 1024;

#[derive(OpenApi)]
#[openapi(paths(generate), components(schemas(GenerateRequest, GenerateResponse)))]
pub struct GenerateApi;

/// Register the submission route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
}

/// Submit a synthesis task (`POST /api/v1/generate`).
///
/// Multipart fields:
/// - `source_image` (file, required) – face photo; jpg/jpeg/png/bmp/tiff/webp
/// - `driven_audio` (file, required) – speech; wav/mp3/m4a/flac/aac/ogg
/// - `preprocess`, `still_mode`, `use_enhancer`, `batch_size`, `size`,
///   `pose_style`, `expression_scale` (text, optional) – engine parameters
///
/// Returns `{"task_id": "...", "status": "queued"}` without waiting for a
/// free execution slot.
#[utoipa::path(
    post,
    path = "/api/v1/generate",
    tag = "generate",
    request_body(content = GenerateRequest, content_type = "multipart/form-data", description = "Source image + driven audio + optional parameters"),
    responses(
        (status = 200, description = "Task accepted", body = GenerateResponse),
        (status = 400, description = "Invalid parameters or file format"),
        (status = 503, description = "Submission queue full"),
    )
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, ServerError> {
    let mut image: Option<Upload> = None;
    let mut audio: Option<Upload> = None;
    let mut params = GenerationParams::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "source_image" => {
                let filename = field.file_name().unwrap_or("source_image").to_owned();
                let bytes = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read source_image: {e}"))
                })?;
                image = Some(Upload::new(filename, bytes));
            }
            "driven_audio" => {
                let filename = field.file_name().unwrap_or("driven_audio").to_owned();
                let bytes = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read driven_audio: {e}"))
                })?;
                audio = Some(Upload::new(filename, bytes));
            }
            "preprocess" => params.preprocess = text(field, &name).await?.parse()?,
            "still_mode" => params.still_mode = parse_bool(&name, &text(field, &name).await?)?,
            "use_enhancer" => params.use_enhancer = parse_bool(&name, &text(field, &name).await?)?,
            "batch_size" => params.batch_size = parse_number(&name, &text(field, &name).await?)?,
            "size" => params.size = parse_number(&name, &text(field, &name).await?)?,
            "pose_style" => params.pose_style = parse_number(&name, &text(field, &name).await?)?,
            "expression_scale" => {
                params.expression_scale = parse_number(&name, &text(field, &name).await?)?
            }
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let image =
        image.ok_or_else(|| ServerError::BadRequest("missing 'source_image' field".to_owned()))?;
    let audio =
        audio.ok_or_else(|| ServerError::BadRequest("missing 'driven_audio' field".to_owned()))?;

    let task_id = state.manager.create(image, audio, params).await?;
    Ok(Json(GenerateResponse {
        task_id: task_id.to_string(),
        status: "queued".to_owned(),
        message: "Task is queued for processing".to_owned(),
    }))
}

async fn text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, ServerError> {
    field
        .text()
        .await
        .map_err(|e| ServerError::BadRequest(format!("failed to read field '{name}': {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ServerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ServerError::BadRequest(format!(
            "invalid value for '{name}': '{other}' (expected true or false)"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ServerError> {
    value.trim().parse().map_err(|_| {
        ServerError::BadRequest(format!("invalid value for '{name}': '{value}'"))
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn booleans_accept_common_spellings() {
        for v in ["true", "1", "YES"] {
            assert!(parse_bool("still_mode", v).expect("parses"));
        }
        for v in ["false", "0", "no"] {
            assert!(!parse_bool("still_mode", v).expect("parses"));
        }
        assert!(parse_bool("still_mode", "maybe").is_err());
    }

    #[test]
    fn numbers_report_the_field_name() {
        let err = parse_number::<u32>("batch_size", "lots").expect_err("not a number");
        assert!(err.to_string().contains("batch_size"));
    }
}
