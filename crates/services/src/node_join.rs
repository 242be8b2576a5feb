//! # Node Onboarding
//!
//! The operator-facing node flows: registry mutations followed by a DNS
//! publish, and the join flow that hands a new node the head node's join
//! secret. A failed publish is logged and left for the next reconciliation
//! pass; the registry write stands.

use std::sync::Arc;

use domains::{
    parse_node_address, AddressPolicy, DomainError, HeadNode, NewNode, NodeFilter, NodeRecord,
    Result,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::dns_sync::DnsSynchronizer;
use crate::node_registry::NodeRegistry;
use crate::retry::RetryPolicy;

/// What a joining node needs to run the cluster join command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinTicket {
    pub node: NodeRecord,
    pub secret: String,
}

pub struct NodeOnboarding {
    registry: Arc<NodeRegistry>,
    dns: Arc<DnsSynchronizer>,
    head_node: Arc<dyn HeadNode>,
    retry: RetryPolicy,
}

impl NodeOnboarding {
    pub fn new(
        registry: Arc<NodeRegistry>,
        dns: Arc<DnsSynchronizer>,
        head_node: Arc<dyn HeadNode>,
        retry: RetryPolicy,
    ) -> Self {
        Self { registry, dns, head_node, retry }
    }

    pub async fn add_and_publish(&self, request: NewNode) -> Result<NodeRecord> {
        let node = self.registry.add_node(request).await?;
        self.publish().await;
        Ok(node)
    }

    pub async fn delete_and_publish(&self, filter: NodeFilter) -> Result<u64> {
        let deleted = self.registry.delete_node(filter).await?;
        if deleted > 0 {
            self.publish().await;
        }
        Ok(deleted)
    }

    /// The secret is fetched before anything is stored, so an unreachable head
    /// node leaves the registry untouched.
    #[instrument(skip(self, request), fields(node = %request.name))]
    pub async fn join_node(&self, request: NewNode) -> Result<JoinTicket> {
        let secret = self.fetch_secret().await?;
        let node = self.add_and_publish(request).await?;
        info!(address = %node.address, "node joined");
        Ok(JoinTicket { node, secret })
    }

    /// Re-issues a secret, but only for a node registered under exactly this pair.
    #[instrument(skip(self))]
    pub async fn rejoin_secret(&self, name: &str, address: &str) -> Result<String> {
        let address = parse_node_address(address, AddressPolicy::AnyIpv4)?;
        if self.registry.find_exact(name, address).await?.is_none() {
            return Err(DomainError::NotFound(format!("no node {name} registered at {address}")));
        }
        self.fetch_secret().await
    }

    async fn fetch_secret(&self) -> Result<String> {
        self.retry
            .run("head node fetch_join_secret", || self.head_node.fetch_join_secret())
            .await
    }

    async fn publish(&self) {
        if let Err(err) = self.dns.sync().await {
            warn!(error = %err, "dns publish failed; next pass will retry");
        }
    }
}
