use std::sync::Arc;

use domains::{AddressPolicy, DomainError, NewNode, NodeFilter, NodeRecord, NodeRepo};
use integration_tests::{node_repo, BACKENDS};
use services::NodeRegistry;

fn node(name: &str, address: &str) -> NewNode {
    NewNode { name: name.into(), address: address.into(), location: None }
}

#[tokio::test]
async fn add_then_find_returns_exactly_that_record() {
    for backend in BACKENDS {
        let registry = NodeRegistry::new(node_repo(backend).await, AddressPolicy::PublicOnly);
        for (name, address) in [("node1", "8.8.8.8"), ("a", "1.1.1.1"), ("edge-7", "9.9.9.9")] {
            registry.add_node(node(name, address)).await.unwrap();
            let found = registry.find_nodes(&NodeFilter::by_name(name)).await.unwrap();
            assert_eq!(found.len(), 1, "{backend:?}");
            assert_eq!(found[0].name, name);
            assert_eq!(found[0].address.to_string(), address);
        }
    }
}

#[tokio::test]
async fn re_adding_a_pair_is_a_noop_and_conflicts_change_nothing() {
    for backend in BACKENDS {
        let registry = NodeRegistry::new(node_repo(backend).await, AddressPolicy::PublicOnly);
        let first = registry.add_node(node("node1", "8.8.8.8")).await.unwrap();
        let again = registry.add_node(node("node1", "8.8.8.8")).await.unwrap();
        assert_eq!((first.name, first.address), (again.name, again.address), "{backend:?}");

        for conflicting in [node("node1", "8.8.4.4"), node("node2", "8.8.8.8")] {
            let err = registry.add_node(conflicting).await.unwrap_err();
            assert!(matches!(err, DomainError::Duplicate(_)), "{backend:?}: {err}");
        }

        let all = registry.find_nodes(&NodeFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1, "{backend:?}");
        assert_eq!(all[0].address.to_string(), "8.8.8.8");
    }
}

#[tokio::test]
async fn names_are_unique_regardless_of_case() {
    for backend in BACKENDS {
        let nodes = node_repo(backend).await;
        let registry = NodeRegistry::new(nodes.clone(), AddressPolicy::PublicOnly);
        registry.add_node(node("node1", "8.8.8.8")).await.unwrap();

        let err = registry.add_node(node("NODE1", "8.8.4.4")).await.unwrap_err();
        assert!(matches!(err, DomainError::Duplicate(_)), "{backend:?}: {err}");
        let same = registry.add_node(node("Node1", "8.8.8.8")).await.unwrap();
        assert_eq!(same.name, "node1", "{backend:?}");

        // the stores hold the line even when the registry is bypassed
        let raw = NodeRecord::new("NODE1", "8.8.4.4".parse().unwrap(), None);
        let err = nodes.insert_unique(raw).await.unwrap_err();
        assert!(matches!(err, DomainError::Duplicate(_)), "{backend:?}: {err}");

        let all = registry.find_nodes(&NodeFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1, "{backend:?}");
        let upper = NodeRegistry::parse_filter(Some("NODE1".into()), None).unwrap();
        assert_eq!(registry.find_nodes(&upper).await.unwrap().len(), 1, "{backend:?}");
    }
}

#[tokio::test]
async fn delete_without_filter_is_a_noop_and_by_name_is_precise() {
    for backend in BACKENDS {
        let registry = NodeRegistry::new(node_repo(backend).await, AddressPolicy::PublicOnly);
        registry.add_node(node("x", "8.8.8.8")).await.unwrap();
        registry.add_node(node("y", "8.8.4.4")).await.unwrap();

        assert_eq!(registry.delete_node(NodeFilter::default()).await.unwrap(), 0);
        assert_eq!(registry.find_nodes(&NodeFilter::default()).await.unwrap().len(), 2);

        assert_eq!(registry.delete_node(NodeFilter::by_name("x")).await.unwrap(), 1, "{backend:?}");
        let left = registry.find_nodes(&NodeFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].name, "y");
    }
}

#[tokio::test]
async fn concurrent_claims_on_an_address_leave_one_owner() {
    for backend in BACKENDS {
        let registry = Arc::new(NodeRegistry::new(node_repo(backend).await, AddressPolicy::PublicOnly));
        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.add_node(node(&format!("racer{i}"), "8.8.8.8")).await })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => winners += 1,
                Err(err) => assert!(matches!(err, DomainError::Duplicate(_)), "{backend:?}: {err}"),
            }
        }
        assert_eq!(winners, 1, "{backend:?}");
        let owners = registry
            .find_nodes(&NodeFilter::by_address("8.8.8.8".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(owners.len(), 1);
    }
}
