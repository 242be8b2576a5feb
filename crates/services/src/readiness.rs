//! # Readiness Reconciler
//!
//! Reflects live cluster membership into `NodeRecord::ready`. Flags only move
//! after a complete, successful status fetch; an unreachable orchestrator
//! leaves every flag as it was.

use std::collections::HashSet;
use std::sync::Arc;

use domains::{
    NodeDomain, NodeFilter, NodeListSnapshot, NodeRepo, NodeStatusSource, Result, SnapshotRepo,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::report::{ItemError, Stage};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    /// Entries in the orchestrator's list
    pub reported: usize,
    pub ready: usize,
    pub not_ready: usize,
    /// Flags that actually flipped
    pub changed: usize,
    /// Live hosts with no registry entry
    pub unregistered: Vec<String>,
    pub errors: Vec<ItemError>,
}

pub struct ReadinessReconciler {
    nodes: Arc<dyn NodeRepo>,
    snapshots: Arc<dyn SnapshotRepo>,
    status: Arc<dyn NodeStatusSource>,
    domain: NodeDomain,
    retry: RetryPolicy,
}

impl ReadinessReconciler {
    pub fn new(
        nodes: Arc<dyn NodeRepo>,
        snapshots: Arc<dyn SnapshotRepo>,
        status: Arc<dyn NodeStatusSource>,
        domain: NodeDomain,
        retry: RetryPolicy,
    ) -> Self {
        Self { nodes, snapshots, status, domain, retry }
    }

    /// Fails only when the orchestrator or the registry cannot be read; per-node
    /// write failures are collected in the report.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReadinessReport> {
        let live = self
            .retry
            .run("orchestrator get_node_status", || self.status.get_node_status())
            .await?;
        let nodes = self.nodes.find(&NodeFilter::default()).await?;

        let ready_names: HashSet<String> = live
            .iter()
            .filter(|s| s.ready)
            .map(|s| self.domain.normalize_hostname(&s.hostname).to_ascii_lowercase())
            .collect();
        let registered: HashSet<String> =
            nodes.iter().map(|n| n.name.to_ascii_lowercase()).collect();

        let mut report = ReadinessReport {
            reported: live.len(),
            unregistered: live
                .iter()
                .map(|s| self.domain.normalize_hostname(&s.hostname))
                .filter(|name| !registered.contains(&name.to_ascii_lowercase()))
                .map(str::to_string)
                .collect(),
            ..ReadinessReport::default()
        };

        for node in &nodes {
            let ready = ready_names.contains(&node.name.to_ascii_lowercase());
            if ready {
                report.ready += 1;
            } else {
                report.not_ready += 1;
            }
            if node.ready == ready {
                continue;
            }
            match self.nodes.set_ready(&node.name, ready).await {
                Ok(true) => report.changed += 1,
                // deleted between the read and the write
                Ok(false) => {}
                Err(err) => {
                    warn!(node = %node.name, error = %err, "failed to update readiness");
                    report.errors.push(ItemError::new(Stage::Readiness, &node.name, &err));
                }
            }
        }

        let snapshot = NodeListSnapshot::new_active(live.into_iter().map(|s| s.hostname).collect());
        if let Err(err) = self.snapshots.rotate(snapshot).await {
            warn!(error = %err, "failed to store node list snapshot");
            report.errors.push(ItemError::new(Stage::Readiness, "node list snapshot", &err));
        }

        info!(
            ready = report.ready,
            not_ready = report.not_ready,
            changed = report.changed,
            "readiness reconciled"
        );
        Ok(report)
    }

    pub async fn current_snapshot(&self) -> Result<Option<NodeListSnapshot>> {
        self.snapshots.active().await
    }

    pub async fn snapshot_history(&self, limit: usize) -> Result<Vec<NodeListSnapshot>> {
        self.snapshots.history(limit).await
    }
}
