//! # Node Registry
//!
//! Validates node mutations and delegates the uniqueness-checked writes to the
//! backing `NodeRepo`, which performs each check-then-act as one transaction.

use std::net::Ipv4Addr;
use std::sync::Arc;

use domains::{
    fold_node_name, parse_node_address, validate_node_name, AddressPolicy, DomainError, Insertion,
    NewNode, NodeFilter, NodeRecord, NodeRepo, Result,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub total: usize,
    pub ready: usize,
}

pub struct NodeRegistry {
    repo: Arc<dyn NodeRepo>,
    address_policy: AddressPolicy,
}

impl NodeRegistry {
    pub fn new(repo: Arc<dyn NodeRepo>, address_policy: AddressPolicy) -> Self {
        Self { repo, address_policy }
    }

    /// Registers a node. Re-adding an identical `{name, address}` pair returns
    /// the stored record; any other overlap is a `Duplicate`.
    #[instrument(skip(self, request), fields(node = %request.name, address = %request.address))]
    pub async fn add_node(&self, request: NewNode) -> Result<NodeRecord> {
        let name = fold_node_name(&request.name);
        validate_node_name(&name)?;
        let address = parse_node_address(&request.address, self.address_policy)?;

        let record = NodeRecord::new(name, address, request.location);
        match self.repo.insert_unique(record).await? {
            Insertion::Inserted(record) => {
                info!("node registered");
                Ok(record)
            }
            Insertion::Existing(record) => {
                debug!("node already registered with the same address");
                Ok(record)
            }
        }
    }

    /// Deletes every node matching `filter`. An empty filter deletes nothing.
    #[instrument(skip(self))]
    pub async fn delete_node(&self, filter: NodeFilter) -> Result<u64> {
        if filter.is_empty() {
            warn!("refusing to delete nodes without a filter");
            return Ok(0);
        }
        let deleted = self.repo.delete(&filter).await?;
        info!(deleted, "nodes deleted");
        Ok(deleted)
    }

    /// All nodes matching `filter`; every node when the filter is empty.
    pub async fn find_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>> {
        self.repo.find(filter).await
    }

    /// The record registered under exactly this `{name, address}` pair.
    pub async fn find_exact(&self, name: &str, address: Ipv4Addr) -> Result<Option<NodeRecord>> {
        let filter = NodeFilter { name: Some(fold_node_name(name)), address: Some(address) };
        Ok(self.repo.find(&filter).await?.into_iter().next())
    }

    /// Only the readiness reconciler calls this.
    pub async fn set_ready(&self, name: &str, ready: bool) -> Result<()> {
        if self.repo.set_ready(&fold_node_name(name), ready).await? {
            Ok(())
        } else {
            Err(DomainError::NotFound(format!("node {name}")))
        }
    }

    pub async fn summary(&self) -> Result<NodeSummary> {
        let nodes = self.repo.find(&NodeFilter::default()).await?;
        Ok(NodeSummary {
            total: nodes.len(),
            ready: nodes.iter().filter(|n| n.ready).count(),
        })
    }

    /// Builds a lookup/delete filter from raw request parameters. Addresses
    /// only need to be syntactically valid here.
    pub fn parse_filter(name: Option<String>, address: Option<&str>) -> Result<NodeFilter> {
        let address = address
            .map(|raw| parse_node_address(raw, AddressPolicy::AnyIpv4))
            .transpose()?;
        let name = name.map(|n| fold_node_name(&n)).filter(|n| !n.is_empty());
        Ok(NodeFilter { name, address })
    }
}
