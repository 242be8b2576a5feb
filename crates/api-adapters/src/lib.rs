//! sundew/crates/api-adapters/src/lib.rs
//!
//! The HTTP front door. Handlers stay thin: parse the request, call one
//! service operation, map the error. No authentication is performed here.

pub mod metrics;
pub mod state;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod routes;

// Re-exporting for easier access in other crates
pub use metrics::Metrics;
pub use state::AppState;

#[cfg(feature = "web-axum")]
pub use routes::router;
