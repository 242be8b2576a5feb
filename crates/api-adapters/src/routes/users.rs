//! User onboarding and namespace endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use domains::{Confirmation, DomainError, UserRecord};
use serde::Deserialize;

use crate::error::{status_for, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Registration {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct Approval {
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct Administrator {
    pub administrator: bool,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceForm {
    #[serde(default)]
    pub namespace: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Registration>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.lifecycle.register_user(&body.email).await?))
}

pub async fn agree_to_terms(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.lifecycle.agree_to_terms(&email).await?))
}

pub async fn set_approval(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(body): Json<Approval>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.lifecycle.set_approved(&email, body.approved).await?))
}

pub async fn set_administrator(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(body): Json<Administrator>,
) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.lifecycle.set_administrator(&email, body.administrator).await?))
}

/// The namespace configuration, served as a download.
pub async fn config(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let config = state.lifecycle.config_for(&email).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"config\""),
        ],
        config,
    ))
}

/// Head-node callback; posted as a form by the namespace creation script.
/// Refusals keep the callback's `{outcome, reason}` shape.
pub async fn confirm_namespace(
    State(state): State<AppState>,
    Form(form): Form<NamespaceForm>,
) -> ApiResult<Response> {
    match state.lifecycle.confirm_namespace(form.namespace.trim()).await {
        Ok(confirmation) => Ok(Json(confirmation).into_response()),
        Err(
            err @ (DomainError::Validation(_)
            | DomainError::NotFound(_)
            | DomainError::Consistency(_)),
        ) => {
            let body = Confirmation::failure(err.message());
            Ok((status_for(err.kind()), Json(body)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}
