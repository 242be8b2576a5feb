//! # DNS Synchronizer
//!
//! Makes the provider's managed `A` records equal to the node registry.
//!
//! One fetch, one whole-list write. Unmanaged records (other types, labels
//! outside the managed suffix) are written back exactly as fetched. When the
//! managed subset already matches, nothing is written. Syncs on one
//! synchronizer run one at a time, so a slow writer cannot replace the zone
//! with an older view of the registry.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use domains::{
    DnsHostRecord, DnsProvider, DomainError, NodeDomain, NodeFilter, NodeRecord, NodeRepo, Result,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DnsSyncSummary {
    pub managed: usize,
    pub unmanaged: usize,
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    /// False when the provider already matched and no write was issued
    pub written: bool,
}

pub struct DnsSynchronizer {
    nodes: Arc<dyn NodeRepo>,
    dns: Arc<dyn DnsProvider>,
    domain: NodeDomain,
    retry: RetryPolicy,
    sync_lock: Mutex<()>,
}

impl DnsSynchronizer {
    pub fn new(
        nodes: Arc<dyn NodeRepo>,
        dns: Arc<dyn DnsProvider>,
        domain: NodeDomain,
        retry: RetryPolicy,
    ) -> Self {
        Self { nodes, dns, domain, retry, sync_lock: Mutex::new(()) }
    }

    pub fn zone(&self) -> &str {
        &self.domain.zone
    }

    #[instrument(skip(self), fields(zone = %self.domain.zone))]
    pub async fn sync(&self) -> Result<DnsSyncSummary> {
        let _guard = self.sync_lock.lock().await;
        let zone = self.domain.zone.as_str();
        let current = self
            .retry
            .run("dns get_host_records", || self.dns.get_host_records(zone))
            .await?;

        let (managed, unmanaged): (Vec<_>, Vec<_>) =
            current.into_iter().partition(|record| self.is_managed(record));

        let mut nodes = self.nodes.find(&NodeFilter::default()).await?;
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        self.check_collisions(&nodes, &managed)?;

        let desired: Vec<DnsHostRecord> = nodes
            .iter()
            .map(|node| DnsHostRecord::a(self.domain.host_label(&node.name), node.address))
            .collect();

        let mut summary = diff(&managed, &desired);
        summary.managed = desired.len();
        summary.unmanaged = unmanaged.len();

        if summary.added == 0 && summary.updated == 0 && summary.removed == 0 {
            debug!(managed = summary.managed, "dns already in sync");
            return Ok(summary);
        }

        let mut next = unmanaged;
        next.extend(desired);
        self.retry
            .run("dns set_host_records", || self.dns.set_host_records(zone, &next))
            .await?;

        summary.written = true;
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "dns host records replaced"
        );
        Ok(summary)
    }

    fn is_managed(&self, record: &DnsHostRecord) -> bool {
        record.is_a_record() && self.domain.node_name_for_label(&record.name).is_some()
    }

    /// A node not yet published must not take a label or address that a
    /// managed record already holds for a different node.
    fn check_collisions(&self, nodes: &[NodeRecord], managed: &[DnsHostRecord]) -> Result<()> {
        for node in nodes {
            let label = self.domain.host_label(&node.name);
            let address = node.address.to_string();
            if managed.iter().any(|r| r.name == label && r.address == address) {
                continue;
            }
            for record in managed {
                let same_label = record.name.eq_ignore_ascii_case(&label);
                if same_label && record.name != label {
                    return Err(DomainError::Duplicate(format!(
                        "node {} collides with existing host record {}",
                        node.name, record.name
                    )));
                }
                if !same_label && record.address == address {
                    return Err(DomainError::Duplicate(format!(
                        "address {} of node {} is already published as {}",
                        address, node.name, record.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn diff(managed: &[DnsHostRecord], desired: &[DnsHostRecord]) -> DnsSyncSummary {
    let current: BTreeMap<&str, BTreeSet<&str>> =
        managed.iter().fold(BTreeMap::new(), |mut acc, r| {
            acc.entry(r.name.as_str()).or_default().insert(r.address.as_str());
            acc
        });
    let wanted: BTreeMap<&str, &str> =
        desired.iter().map(|r| (r.name.as_str(), r.address.as_str())).collect();

    let mut summary = DnsSyncSummary::default();
    for (label, address) in &wanted {
        match current.get(label) {
            None => summary.added += 1,
            Some(addresses) if addresses.len() == 1 && addresses.contains(address) => {}
            Some(_) => summary.updated += 1,
        }
    }
    summary.removed = current.keys().filter(|label| !wanted.contains_key(*label)).count();
    summary
}
