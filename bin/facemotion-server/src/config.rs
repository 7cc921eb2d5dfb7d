//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use facemotion_core::ManagerOptions;

/// Runtime configuration for facemotion-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// Root directory of the artifact store (default: `"./data"`).
    pub data_dir: String,

    /// Command invoked for each synthesis run (default: `"sadtalker"`).
    pub engine_command: String,

    /// Concurrent synthesis slots; one per GPU (default: 1).
    pub gpu_slots: usize,

    /// Submission-queue capacity before `POST /generate` starts rejecting.
    pub queue_capacity: usize,

    /// Wall-clock ceiling on a single synthesis run, in seconds.
    pub processing_timeout_secs: u64,

    /// Hours a terminal task survives before the retention sweeper purges
    /// it.  0 disables the sweeper entirely.
    pub retention_hours: u64,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` means wildcard.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI at `/swagger-ui` (default: true; disable in
    /// production with `FACEMOTION_ENABLE_SWAGGER=false`).
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("FACEMOTION_BIND", "0.0.0.0:8000"),
            data_dir: env_or("FACEMOTION_DATA_DIR", "./data"),
            engine_command: env_or("FACEMOTION_ENGINE_CMD", "sadtalker"),
            gpu_slots: parse_env("FACEMOTION_GPU_SLOTS", 1),
            queue_capacity: parse_env("FACEMOTION_QUEUE_CAPACITY", 64),
            processing_timeout_secs: parse_env("FACEMOTION_PROCESSING_TIMEOUT_SECS", 1800),
            retention_hours: parse_env("FACEMOTION_RETENTION_HOURS", 24),
            log_level: env_or("FACEMOTION_LOG", "info"),
            log_json: std::env::var("FACEMOTION_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            cors_allowed_origins: std::env::var("FACEMOTION_CORS_ORIGINS").ok(),
            enable_swagger: std::env::var("FACEMOTION_ENABLE_SWAGGER")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        }
    }

    /// Translate the env-derived knobs into the core's option struct.
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            gpu_slots: self.gpu_slots.max(1),
            queue_capacity: self.queue_capacity.max(1),
            processing_ceiling: Duration::from_secs(self.processing_timeout_secs.max(1)),
            retention: match self.retention_hours {
                0 => None,
                hours => Some(Duration::from_secs(hours * 3600)),
            },
            ..ManagerOptions::default()
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
