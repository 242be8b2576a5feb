//! Reconciliation trigger and metrics exposition.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::error;

use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ReportFormat {
    /// `text` for the plain-text summary; JSON otherwise
    pub format: Option<String>,
}

/// Runs one pass. Always 200: stage failures are part of the report.
pub async fn run_pass(
    State(state): State<AppState>,
    Query(query): Query<ReportFormat>,
) -> Response {
    let report = state.run_pass().await;
    match query.format.as_deref() {
        Some("text") => report.to_string().into_response(),
        _ => Json(report).into_response(),
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
