//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use facemotion_core::TaskManager;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The orchestration core; owns tasks, slots and artifacts.
    pub manager: TaskManager,
}
