//! Route table for the sundew HTTP front door.

pub mod nodes;
pub mod reconcile;
pub mod users;

use axum::routing::{get, post};
use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/nodes",
            get(nodes::find_nodes).post(nodes::add_node).delete(nodes::delete_nodes),
        )
        .route("/nodes/join", post(nodes::join_node))
        .route("/nodes/secret", post(nodes::rejoin_secret))
        .route("/nodes/snapshot", get(nodes::current_snapshot))
        .route("/nodes/snapshots", get(nodes::snapshot_history))
        .route("/nodes/summary", get(nodes::summary))
        .route("/users", post(users::register))
        .route("/users/{email}/terms", post(users::agree_to_terms))
        .route("/users/{email}/approval", post(users::set_approval))
        .route("/users/{email}/administrator", post(users::set_administrator))
        .route("/users/{email}/config", get(users::config))
        .route("/confirm_namespace", post(users::confirm_namespace))
        .route("/reconcile", post(reconcile::run_pass))
        .route("/metrics", get(reconcile::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
