//! # Reconciliation Driver
//!
//! One pass runs DNS sync, then readiness, then lifecycle advancement, in that
//! order. A failing stage is recorded and the pass moves on; it never aborts.
//! Callers must not run two passes at once.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::dns_sync::{DnsSyncSummary, DnsSynchronizer};
use crate::lifecycle::NamespaceLifecycle;
use crate::readiness::{ReadinessReconciler, ReadinessReport};
use crate::report::{ItemError, Stage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dns: Option<DnsSyncSummary>,
    pub readiness: Option<ReadinessReport>,
    pub namespaces_created: Vec<String>,
    pub configs_cached: Vec<String>,
    pub errors: Vec<ItemError>,
}

impl PassReport {
    fn started() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            dns: None,
            readiness: None,
            namespaces_created: Vec::new(),
            configs_cached: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn nodes_ready(&self) -> usize {
        self.readiness.as_ref().map_or(0, |r| r.ready)
    }

    pub fn nodes_not_ready(&self) -> usize {
        self.readiness.as_ref().map_or(0, |r| r.not_ready)
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for PassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Namespaces created: {}", list_or_none(&self.namespaces_created))?;
        writeln!(f, "Configurations stored for: {}", list_or_none(&self.configs_cached))?;
        match &self.dns {
            Some(dns) => writeln!(
                f,
                "DNS: {} added, {} updated, {} removed",
                dns.added, dns.updated, dns.removed
            )?,
            None => writeln!(f, "DNS: not synchronized")?,
        }
        match &self.readiness {
            Some(_) => writeln!(
                f,
                "Nodes ready: {}, not ready: {}",
                self.nodes_ready(),
                self.nodes_not_ready()
            )?,
            None => writeln!(f, "Nodes: readiness unknown")?,
        }
        write!(f, "Errors:")?;
        if self.errors.is_empty() {
            write!(f, " none")?;
        }
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

pub struct ReconciliationDriver {
    dns: Arc<DnsSynchronizer>,
    readiness: Arc<ReadinessReconciler>,
    lifecycle: Arc<NamespaceLifecycle>,
}

impl ReconciliationDriver {
    pub fn new(
        dns: Arc<DnsSynchronizer>,
        readiness: Arc<ReadinessReconciler>,
        lifecycle: Arc<NamespaceLifecycle>,
    ) -> Self {
        Self { dns, readiness, lifecycle }
    }

    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> PassReport {
        let mut report = PassReport::started();

        match self.dns.sync().await {
            Ok(summary) => report.dns = Some(summary),
            Err(err) => {
                warn!(error = %err, "dns sync failed");
                report.errors.push(ItemError::new(Stage::DnsSync, self.dns.zone(), &err));
            }
        }

        match self.readiness.reconcile().await {
            Ok(mut readiness) => {
                report.errors.append(&mut readiness.errors);
                report.readiness = Some(readiness);
            }
            Err(err) => {
                warn!(error = %err, "readiness reconciliation failed");
                report.errors.push(ItemError::new(Stage::Readiness, "orchestrator", &err));
            }
        }

        let mut lifecycle = self.lifecycle.advance_all().await;
        report.namespaces_created = lifecycle.namespaces_requested;
        report.configs_cached = lifecycle.configs_cached;
        report.errors.append(&mut lifecycle.errors);

        report.finished_at = Utc::now();
        info!(
            namespaces_created = report.namespaces_created.len(),
            configs_cached = report.configs_cached.len(),
            errors = report.errors.len(),
            "reconciliation pass finished"
        );
        report
    }
}
