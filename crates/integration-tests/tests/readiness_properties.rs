use std::sync::Arc;

use domains::{
    AddressPolicy, MockNodeStatusSource, NewNode, NodeDomain, NodeFilter, NodeRepo, NodeStatus,
    RemoteError, SnapshotRepo,
};
use integration_tests::{node_repo, sqlite, BACKENDS};
use services::{NodeRegistry, ReadinessReconciler, RetryPolicy};
use storage_adapters::MemorySnapshotRepo;

async fn register(nodes: &Arc<dyn NodeRepo>, names: &[(&str, &str)]) {
    let registry = NodeRegistry::new(nodes.clone(), AddressPolicy::PublicOnly);
    for (name, address) in names {
        registry
            .add_node(NewNode { name: name.to_string(), address: address.to_string(), location: None })
            .await
            .unwrap();
    }
}

fn reporting(statuses: Vec<NodeStatus>) -> MockNodeStatusSource {
    let mut status = MockNodeStatusSource::new();
    status.expect_get_node_status().returning(move || Ok(statuses.clone()));
    status
}

async fn ready_flags(nodes: &Arc<dyn NodeRepo>) -> Vec<(String, bool)> {
    let mut flags: Vec<_> = nodes
        .find(&NodeFilter::default())
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.name, n.ready))
        .collect();
    flags.sort();
    flags
}

#[tokio::test]
async fn live_nodes_become_ready_and_others_do_not() {
    for backend in BACKENDS {
        let nodes = node_repo(backend).await;
        register(&nodes, &[("node1", "8.8.8.8"), ("node2", "8.8.4.4")]).await;

        let reconciler = ReadinessReconciler::new(
            nodes.clone(),
            Arc::new(MemorySnapshotRepo::new()),
            Arc::new(reporting(vec![NodeStatus { hostname: "node1.edge-net.io".into(), ready: true }])),
            NodeDomain::new("edge-net.io", ""),
            RetryPolicy::default(),
        );
        let report = reconciler.reconcile().await.unwrap();

        assert_eq!((report.ready, report.not_ready), (1, 1), "{backend:?}");
        assert_eq!(
            ready_flags(&nodes).await,
            vec![("node1".to_string(), true), ("node2".to_string(), false)]
        );
    }
}

#[tokio::test]
async fn unreachable_orchestrator_leaves_flags_untouched() {
    let store = sqlite().await;
    let nodes: Arc<dyn NodeRepo> = store.clone();
    register(&nodes, &[("node1", "8.8.8.8"), ("node2", "8.8.4.4")]).await;
    nodes.set_ready("node2", true).await.unwrap();
    let before = ready_flags(&nodes).await;

    let mut status = MockNodeStatusSource::new();
    status
        .expect_get_node_status()
        .times(2)
        .returning(|| Err(RemoteError::Unreachable("orchestrator timed out".into())));
    let reconciler = ReadinessReconciler::new(
        nodes.clone(),
        store.clone(),
        Arc::new(status),
        NodeDomain::new("edge-net.io", ""),
        RetryPolicy::default(),
    );

    assert!(reconciler.reconcile().await.is_err());
    assert_eq!(ready_flags(&nodes).await, before);
    assert!(store.active().await.unwrap().is_none());
}

#[tokio::test]
async fn each_pass_rotates_the_active_snapshot() {
    let store = sqlite().await;
    let nodes: Arc<dyn NodeRepo> = store.clone();
    register(&nodes, &[("node1", "8.8.8.8")]).await;

    let reconciler = ReadinessReconciler::new(
        nodes,
        store.clone(),
        Arc::new(reporting(vec![
            NodeStatus { hostname: "node1.edge-net.io".into(), ready: true },
            NodeStatus { hostname: "head.edge-net.io".into(), ready: true },
        ])),
        NodeDomain::new("edge-net.io", ""),
        RetryPolicy::default(),
    );
    let first = reconciler.reconcile().await.unwrap();
    assert_eq!(first.unregistered, vec!["head".to_string()]);
    reconciler.reconcile().await.unwrap();

    let history = reconciler.snapshot_history(10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|s| s.active).count(), 1);
    let active = reconciler.current_snapshot().await.unwrap().unwrap();
    assert_eq!(active.nodes, vec!["node1.edge-net.io", "head.edge-net.io"]);
}
