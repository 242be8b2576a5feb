//! Shared handler state.

use std::sync::Arc;

use services::{
    NamespaceLifecycle, NodeOnboarding, NodeRegistry, PassReport, ReadinessReconciler,
    ReconciliationDriver,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub onboarding: Arc<NodeOnboarding>,
    pub lifecycle: Arc<NamespaceLifecycle>,
    pub readiness: Arc<ReadinessReconciler>,
    pub driver: Arc<ReconciliationDriver>,
    pub metrics: Arc<Metrics>,
    /// Held for the duration of a pass; the driver must never run twice at once.
    pass_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        registry: Arc<NodeRegistry>,
        onboarding: Arc<NodeOnboarding>,
        lifecycle: Arc<NamespaceLifecycle>,
        readiness: Arc<ReadinessReconciler>,
        driver: Arc<ReconciliationDriver>,
    ) -> Self {
        Self {
            registry,
            onboarding,
            lifecycle,
            readiness,
            driver,
            metrics: Arc::new(Metrics::new()),
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one pass, waiting for any pass already in flight to finish first.
    /// Used by both the HTTP trigger and the scheduled tick.
    pub async fn run_pass(&self) -> PassReport {
        let _guard = self.pass_lock.lock().await;
        debug!("reconciliation pass lock acquired");
        let report = self.driver.run_pass().await;
        self.metrics.observe_pass(&report);
        report
    }
}
