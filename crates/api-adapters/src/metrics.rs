//! Prometheus metrics for reconciliation passes.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use services::{PassReport, Stage};

pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct StageLabels {
    stage: String,
}

pub struct Metrics {
    registry: Registry,
    passes: Counter,
    stage_errors: Family<StageLabels, Counter>,
    ready_nodes: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("sundew");
        let passes = Counter::default();
        let stage_errors = Family::<StageLabels, Counter>::default();
        let ready_nodes = Gauge::default();

        registry.register("reconcile_passes", "Reconciliation passes run", passes.clone());
        registry.register(
            "stage_errors",
            "Per-item errors recorded by reconciliation stage",
            stage_errors.clone(),
        );
        registry.register("ready_nodes", "Nodes ready at the end of the last pass", ready_nodes.clone());

        Self { registry, passes, stage_errors, ready_nodes }
    }

    pub fn observe_pass(&self, report: &PassReport) {
        self.passes.inc();
        for error in &report.errors {
            self.stage_errors
                .get_or_create(&StageLabels { stage: stage_label(error.stage).to_string() })
                .inc();
        }
        // readiness unknown: keep the last observed value
        if let Some(readiness) = &report.readiness {
            self.ready_nodes.set(readiness.ready as i64);
        }
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::DnsSync => "dns_sync",
        Stage::Readiness => "readiness",
        Stage::NamespaceCreation => "namespace_creation",
        Stage::ConfigFetch => "config_fetch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::DomainError;
    use services::{ItemError, ReadinessReport};

    #[test]
    fn pass_outcomes_are_exported() {
        let metrics = Metrics::new();
        let now = Utc::now();
        let report = PassReport {
            started_at: now,
            finished_at: now,
            dns: None,
            readiness: Some(ReadinessReport { ready: 3, not_ready: 1, ..ReadinessReport::default() }),
            namespaces_created: vec![],
            configs_cached: vec![],
            errors: vec![ItemError::new(
                Stage::DnsSync,
                "edge-net.io",
                &DomainError::Connectivity("timeout".into()),
            )],
        };
        metrics.observe_pass(&report);
        metrics.observe_pass(&PassReport { errors: vec![], readiness: None, ..report });

        let body = metrics.render().unwrap();
        assert!(body.contains("sundew_reconcile_passes_total 2"), "{body}");
        assert!(body.contains(r#"sundew_stage_errors_total{stage="dns_sync"} 1"#), "{body}");
        assert!(body.contains("sundew_ready_nodes 3"), "{body}");
        assert!(body.ends_with("# EOF\n"));
    }
}
