#![allow(dead_code)]

use std::sync::Arc;

use api_adapters::AppState;
use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use domains::{AddressPolicy, MockHeadNode, MockNodeStatusSource, NodeDomain, NodeStatus};
use serde_json::Value;
use services::{
    DnsSynchronizer, NamespaceLifecycle, NodeOnboarding, NodeRegistry, ReadinessReconciler,
    ReconciliationDriver, RetryPolicy,
};
use storage_adapters::{MemoryDnsZone, MemoryNodeRepo, MemorySnapshotRepo, MemoryUserRepo};
use tower::ServiceExt;

pub const ZONE: &str = "edge-net.io";

pub struct Harness {
    pub state: AppState,
    pub zone: Arc<MemoryDnsZone>,
    pub nodes: Arc<MemoryNodeRepo>,
}

pub fn harness(head: MockHeadNode) -> Harness {
    let nodes = Arc::new(MemoryNodeRepo::new());
    let users = Arc::new(MemoryUserRepo::new());
    let zone = Arc::new(MemoryDnsZone::new());
    let head = Arc::new(head);

    let mut status = MockNodeStatusSource::new();
    status.expect_get_node_status().returning(|| {
        Ok(vec![NodeStatus { hostname: format!("node1.{ZONE}"), ready: true }])
    });

    let domain = NodeDomain::new(ZONE, "");
    let retry = RetryPolicy::default();
    let registry = Arc::new(NodeRegistry::new(nodes.clone(), AddressPolicy::PublicOnly));
    let dns = Arc::new(DnsSynchronizer::new(nodes.clone(), zone.clone(), domain.clone(), retry.clone()));
    let readiness = Arc::new(ReadinessReconciler::new(
        nodes.clone(),
        Arc::new(MemorySnapshotRepo::new()),
        Arc::new(status),
        domain,
        retry.clone(),
    ));
    let lifecycle = Arc::new(NamespaceLifecycle::new(users, head.clone(), retry.clone()));
    let onboarding = Arc::new(NodeOnboarding::new(registry.clone(), dns.clone(), head, retry));
    let driver = Arc::new(ReconciliationDriver::new(dns, readiness.clone(), lifecycle.clone()));

    Harness {
        state: AppState::new(registry, onboarding, lifecycle, readiness, driver),
        zone,
        nodes,
    }
}

impl Harness {
    pub fn app(&self) -> Router {
        api_adapters::router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app().oneshot(request).await.unwrap()
    }

    pub async fn json(&self, method: &str, uri: &str, body: Value) -> (u16, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn empty(&self, method: &str, uri: &str) -> (u16, Value) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        read_json(self.send(request).await).await
    }

    pub async fn text(&self, method: &str, uri: &str) -> (u16, String) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = self.send(request).await;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

pub async fn read_json(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}
