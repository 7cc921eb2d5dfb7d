//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (CORS, per-request trace-ID injection)
//! - Optional Swagger UI / OpenAPI spec endpoint (disable with `FACEMOTION_ENABLE_SWAGGER=false`)
//! - Root service-info and health routes
//! - The `/api/v1` task routes

pub mod doc;
mod generate;
mod health;
mod tasks;

use std::sync::Arc;

use axum::routing::get;
use axum::{Router, middleware};
use tower::ServiceBuilder;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{cors, trace};
use crate::state::AppState;

// ── Router builder ────────────────────────────────────────────────────────────

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_v1 = Router::new()
        .merge(generate::router())
        .merge(tasks::router())
        .merge(health::router());

    let mut app = Router::new()
        .route("/", get(health::service_info))
        .nest("/api/v1", api_v1);

    // ── Swagger UI ────────────────────────────────────────────────────────────
    // Enabled by default; disable with FACEMOTION_ENABLE_SWAGGER=false in
    // production to avoid exposing the API structure to potential attackers.
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(state.clone())))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
