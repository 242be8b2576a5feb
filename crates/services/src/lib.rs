//! # services
//!
//! The reconciliation engine: node registry, DNS synchronizer, readiness
//! reconciler, namespace lifecycle manager, node onboarding, and the driver
//! that runs them in sequence. Every component is constructed once with its collaborators
//! injected and is shared by reference afterwards.

pub mod dns_sync;
pub mod driver;
pub mod lifecycle;
pub mod node_join;
pub mod node_registry;
pub mod readiness;
pub mod report;
pub mod retry;

pub use dns_sync::{DnsSyncSummary, DnsSynchronizer};
pub use driver::{PassReport, ReconciliationDriver};
pub use lifecycle::{LifecycleReport, NamespaceLifecycle};
pub use node_join::{JoinTicket, NodeOnboarding};
pub use node_registry::{NodeRegistry, NodeSummary};
pub use readiness::{ReadinessReconciler, ReadinessReport};
pub use report::{ItemError, Stage};
pub use retry::{Backoff, RetryPolicy};
