//! Builds the component graph once at startup. Every service is constructed
//! with its collaborators injected and shared by `Arc` afterwards.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::AppState;
use configs::{BackoffKind, DatabaseSettings, DnsSettings, RetrySettings, Settings};
use domains::{AddressPolicy, DnsProvider, NodeDomain, NodeRepo, SnapshotRepo, UserRepo};
use remote_adapters::HeadNodeClient;
use services::{
    Backoff, DnsSynchronizer, NamespaceLifecycle, NodeOnboarding, NodeRegistry,
    ReadinessReconciler, ReconciliationDriver, RetryPolicy,
};
use storage_adapters::MemoryDnsZone;
use tracing::{info, warn};

struct Stores {
    nodes: Arc<dyn NodeRepo>,
    users: Arc<dyn UserRepo>,
    snapshots: Arc<dyn SnapshotRepo>,
}

#[cfg(feature = "db-sqlite")]
async fn open_stores(database: &DatabaseSettings) -> anyhow::Result<Stores> {
    use secrecy::ExposeSecret;

    let store = Arc::new(
        storage_adapters::SqliteStore::new(database.url.expose_secret(), database.max_connections)
            .await
            .context("opening sqlite store")?,
    );
    Ok(Stores { nodes: store.clone(), users: store.clone(), snapshots: store })
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_stores(_database: &DatabaseSettings) -> anyhow::Result<Stores> {
    use storage_adapters::{MemoryNodeRepo, MemorySnapshotRepo, MemoryUserRepo};

    warn!("built without db-sqlite; all state is kept in memory");
    Ok(Stores {
        nodes: Arc::new(MemoryNodeRepo::new()),
        users: Arc::new(MemoryUserRepo::new()),
        snapshots: Arc::new(MemorySnapshotRepo::new()),
    })
}

fn dns_provider(dns: &DnsSettings) -> Arc<dyn DnsProvider> {
    match &dns.zone_file {
        #[cfg(feature = "dns-local")]
        Some(path) => {
            info!(path = %path.display(), "using local zone file");
            Arc::new(storage_adapters::LocalZoneFile::new(path))
        }
        _ => {
            warn!("no zone file configured; host records are kept in memory");
            Arc::new(MemoryDnsZone::new())
        }
    }
}

pub fn retry_policy(retry: &RetrySettings) -> RetryPolicy {
    let delay = Duration::from_millis(retry.delay_ms);
    let backoff = match retry.backoff {
        BackoffKind::None => Backoff::None,
        BackoffKind::Fixed => Backoff::Fixed(delay),
        BackoffKind::Exponential => Backoff::Exponential {
            initial: delay,
            max: Duration::from_millis(retry.max_delay_ms),
            multiplier: 2.0,
        },
    };
    RetryPolicy::new(retry.max_attempts, backoff)
}

pub async fn build(settings: &Settings) -> anyhow::Result<AppState> {
    if settings.dns.claims_every_a_record() {
        warn!(
            zone = %settings.dns.zone,
            "dns.managed_suffix is empty; every A record with a node-like label in the zone is \
             managed and unregistered ones will be removed"
        );
    }
    let stores = open_stores(&settings.database).await?;
    let dns = dns_provider(&settings.dns);
    let head_node = Arc::new(
        HeadNodeClient::new(&settings.head_node.base_url, settings.head_node.timeout())
            .context("building head node client")?,
    );

    let domain = NodeDomain::new(settings.dns.zone.clone(), settings.dns.managed_suffix.clone());
    let retry = retry_policy(&settings.retry);
    let address_policy = if settings.registry.allow_private_addresses {
        AddressPolicy::AnyIpv4
    } else {
        AddressPolicy::PublicOnly
    };

    let registry = Arc::new(NodeRegistry::new(stores.nodes.clone(), address_policy));
    let synchronizer = Arc::new(DnsSynchronizer::new(
        stores.nodes.clone(),
        dns,
        domain.clone(),
        retry.clone(),
    ));
    let readiness = Arc::new(ReadinessReconciler::new(
        stores.nodes,
        stores.snapshots,
        head_node.clone(),
        domain,
        retry.clone(),
    ));
    let lifecycle = Arc::new(NamespaceLifecycle::new(stores.users, head_node.clone(), retry.clone()));
    let onboarding = Arc::new(NodeOnboarding::new(
        registry.clone(),
        synchronizer.clone(),
        head_node,
        retry,
    ));
    let driver = Arc::new(ReconciliationDriver::new(synchronizer, readiness.clone(), lifecycle.clone()));

    Ok(AppState::new(registry, onboarding, lifecycle, readiness, driver))
}
