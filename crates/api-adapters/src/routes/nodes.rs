//! Node registry endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use domains::{DomainError, NewNode, NodeListSnapshot, NodeRecord};
use serde::{Deserialize, Serialize};
use services::{JoinTicket, NodeRegistry, NodeSummary};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NodeQuery {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub deleted: u64,
}

const MAX_HISTORY: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SecretRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretReply {
    pub secret: String,
}

pub async fn find_nodes(
    State(state): State<AppState>,
    Query(query): Query<NodeQuery>,
) -> ApiResult<Json<Vec<NodeRecord>>> {
    let filter = NodeRegistry::parse_filter(query.name, query.address.as_deref())?;
    Ok(Json(state.registry.find_nodes(&filter).await?))
}

pub async fn add_node(
    State(state): State<AppState>,
    Json(request): Json<NewNode>,
) -> ApiResult<(StatusCode, Json<NodeRecord>)> {
    let node = state.onboarding.add_and_publish(request).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub async fn delete_nodes(
    State(state): State<AppState>,
    Query(query): Query<NodeQuery>,
) -> ApiResult<Json<Deleted>> {
    let filter = NodeRegistry::parse_filter(query.name, query.address.as_deref())?;
    let deleted = state.onboarding.delete_and_publish(filter).await?;
    Ok(Json(Deleted { deleted }))
}

pub async fn join_node(
    State(state): State<AppState>,
    Json(request): Json<NewNode>,
) -> ApiResult<Json<JoinTicket>> {
    Ok(Json(state.onboarding.join_node(request).await?))
}

pub async fn rejoin_secret(
    State(state): State<AppState>,
    Json(request): Json<SecretRequest>,
) -> ApiResult<Json<SecretReply>> {
    let secret = state.onboarding.rejoin_secret(&request.name, &request.address).await?;
    Ok(Json(SecretReply { secret }))
}

pub async fn current_snapshot(State(state): State<AppState>) -> ApiResult<Json<NodeListSnapshot>> {
    state
        .readiness
        .current_snapshot()
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::NotFound("no node list snapshot yet".into()).into())
}

/// Newest first; `limit` defaults to 10 and is capped at 100.
pub async fn snapshot_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<NodeListSnapshot>>> {
    let limit = query.limit.unwrap_or(10).min(MAX_HISTORY);
    Ok(Json(state.readiness.snapshot_history(limit).await?))
}

pub async fn summary(State(state): State<AppState>) -> ApiResult<Json<NodeSummary>> {
    Ok(Json(state.registry.summary().await?))
}
