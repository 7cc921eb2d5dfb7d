//! HTTP layer of the facemotion service.
//!
//! Kept as a library target so the integration tests can build the full
//! router; the binary in `main.rs` is a thin wrapper.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod schemas;
pub mod state;
