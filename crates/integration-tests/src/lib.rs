//! Shared fixtures for the cross-crate property tests.
//!
//! Every property is checked against each repository backend, so the helpers
//! hand out trait objects keyed by [`Backend`].

use std::collections::BTreeSet;
use std::sync::Arc;

use domains::{MockHeadNode, NamespaceAck, NodeRepo, UserRepo};
use fake::faker::internet::en::SafeEmail;
use fake::Fake;
use storage_adapters::{MemoryNodeRepo, MemoryUserRepo, SqliteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sqlite,
}

pub const BACKENDS: [Backend; 2] = [Backend::Memory, Backend::Sqlite];

pub async fn sqlite() -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::new("sqlite::memory:", 1)
            .await
            .expect("in-memory sqlite store"),
    )
}

pub async fn node_repo(backend: Backend) -> Arc<dyn NodeRepo> {
    match backend {
        Backend::Memory => Arc::new(MemoryNodeRepo::new()),
        Backend::Sqlite => sqlite().await,
    }
}

pub async fn user_repo(backend: Backend) -> Arc<dyn UserRepo> {
    match backend {
        Backend::Memory => Arc::new(MemoryUserRepo::new()),
        Backend::Sqlite => sqlite().await,
    }
}

/// A head node that accepts every namespace and serves a config for each.
pub fn cooperative_head_node() -> MockHeadNode {
    let mut head = MockHeadNode::new();
    head.expect_create_namespace().returning(|_| Ok(NamespaceAck::Acknowledged));
    head.expect_fetch_config()
        .returning(|ns| Ok(Some(format!("apiVersion: v1\nnamespace: {ns}\n"))));
    head.expect_fetch_join_secret().returning(|| Ok("kubeadm join --token fixture".into()));
    head
}

/// `count` distinct, realistic email addresses.
pub fn fake_emails(count: usize) -> Vec<String> {
    let mut emails = BTreeSet::new();
    while emails.len() < count {
        let email: String = SafeEmail().fake();
        emails.insert(email.to_lowercase());
    }
    emails.into_iter().collect()
}
