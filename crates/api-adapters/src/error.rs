//! Maps engine errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{DomainError, ErrorKind};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub DomainError);

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Duplicate | ErrorKind::Consistency => StatusCode::CONFLICT,
        ErrorKind::Connectivity => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ErrorBody { error: self.0.to_string(), kind })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
