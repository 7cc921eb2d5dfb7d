//! End-to-end HTTP tests: real router, real task manager, mock engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use facemotion_core::{
    EngineError, FileStore, GenerationParams, ManagerOptions, SynthesisEngine, TaskManager,
};
use serde_json::Value;
use tower::ServiceExt;

use facemotion_server::config::Config;
use facemotion_server::routes;
use facemotion_server::state::AppState;

const BOUNDARY: &str = "----facemotion-test-boundary";

/// Renders instantly by writing a stub video file.
struct StubEngine;

#[async_trait]
impl SynthesisEngine for StubEngine {
    async fn synthesize(
        &self,
        _image: &Path,
        _audio: &Path,
        _params: &GenerationParams,
        result_dir: &Path,
    ) -> Result<PathBuf, EngineError> {
        let path = result_dir.join("result.mp4");
        tokio::fs::write(&path, b"stub-video-bytes")
            .await
            .map_err(|e| EngineError::Other(e.to_string()))?;
        Ok(path)
    }

    fn accelerator_available(&self) -> bool {
        false
    }
}

async fn test_app() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = FileStore::open(dir.path()).await.expect("open store");
    let manager = TaskManager::start(files, Arc::new(StubEngine), ManagerOptions::default());

    let mut cfg = Config::from_env();
    cfg.enable_swagger = false;
    let state = Arc::new(AppState {
        config: Arc::new(cfg),
        manager,
    });
    (dir, routes::build(state))
}

fn multipart_body(fields: &[(&str, Option<&str>, &[u8])]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, filename, content) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(fname) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{fname}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

fn generate_request(fields: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let (content_type, body) = multipart_body(fields);
    Request::builder()
        .method("POST")
        .uri("/api/v1/generate")
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .expect("request builds")
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

async fn submit(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(generate_request(&[
            ("source_image", Some("face.png"), b"png-bytes"),
            ("driven_audio", Some("speech.wav"), b"wav-bytes"),
        ]))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "queued");
    body["task_id"].as_str().expect("task_id present").to_owned()
}

async fn poll_until_terminal(app: &Router, id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/status/{id}"))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        match body["status"].as_str() {
            Some("completed") | Some("failed") => return body,
            _ if tokio::time::Instant::now() > deadline => {
                panic!("task {id} never became terminal: {body}")
            }
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
}

#[tokio::test]
async fn generate_poll_download_delete_lifecycle() {
    let (_dir, app) = test_app().await;

    let id = submit(&app).await;
    let status = poll_until_terminal(&app, &id).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(
        status["download_url"].as_str(),
        Some(format!("/api/v1/download/{id}").as_str())
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/download/{id}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "video/mp4"
    );
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body reads");
    assert_eq!(&bytes[..], b"stub-video-bytes");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/tasks/{id}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);

    // Deleted tasks are gone for good.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/status/{id}"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_parameters_are_rejected_with_400() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(generate_request(&[
            ("source_image", Some("face.png"), b"png-bytes"),
            ("driven_audio", Some("speech.wav"), b"wav-bytes"),
            ("batch_size", None, b"99"),
        ]))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap_or("").contains("batch_size"));
}

#[tokio::test]
async fn missing_file_fields_are_rejected() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(generate_request(&[(
            "source_image",
            Some("face.png"),
            b"png-bytes",
        )]))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap_or("").contains("driven_audio"));
}

#[tokio::test]
async fn unsupported_upload_format_is_rejected() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(generate_request(&[
            ("source_image", Some("face.exe"), b"not-an-image"),
            ("driven_audio", Some("speech.wav"), b"wav-bytes"),
        ]))
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let (_dir, app) = test_app().await;

    let ghost = uuid::Uuid::new_v4();
    for uri in [
        format!("/api/v1/status/{ghost}"),
        format!("/api/v1/download/{ghost}"),
    ] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/status/not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_is_idempotent_over_http() {
    let (_dir, app) = test_app().await;
    let id = submit(&app).await;
    poll_until_terminal(&app, &id).await;

    // Cancelling a terminal task twice returns its unchanged state both times.
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tasks/{id}/cancel"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
    }
}

#[tokio::test]
async fn health_reports_engine_visibility() {
    let (_dir, app) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["gpu_available"], false);
    assert!(!body["version"].as_str().unwrap_or("").is_empty());

    // Every response carries a trace id.
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .expect("request completes");
    assert!(response.headers().contains_key("x-trace-id"));
}
