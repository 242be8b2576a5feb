//! # Core Traits (Ports)
//!
//! Storage backends and remote collaborators implement these traits; the
//! services only ever see them as `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::error::{RemoteError, Result};
use crate::models::{
    DnsHostRecord, Insertion, NamespaceAck, NamespaceStatus, NodeFilter, NodeListSnapshot,
    NodeRecord, NodeStatus, ProfileUpdate, UserRecord,
};

/// Durable store of node records.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NodeRepo: Send + Sync {
    /// Inserts `record` as one transactional unit.
    ///
    /// Returns `Existing` when the identical `{name, address}` pair is already
    /// stored and fails with `Duplicate` when either field belongs to another record.
    async fn insert_unique(&self, record: NodeRecord) -> Result<Insertion>;

    /// Deletes every record matching `filter`. Callers never pass an empty filter.
    async fn delete(&self, filter: &NodeFilter) -> Result<u64>;

    async fn find(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>>;

    /// Returns `false` when no record carries `name`.
    async fn set_ready(&self, name: &str, ready: bool) -> Result<bool>;
}

/// Durable store of portal users.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Atomic find-or-create keyed by email.
    async fn insert_if_absent(&self, record: UserRecord) -> Result<UserRecord>;

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<Option<UserRecord>>;

    async fn list_by_status(&self, status: NamespaceStatus) -> Result<Vec<UserRecord>>;

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<UserRecord>>;

    /// Conditional write: stores `namespace` and moves the user to
    /// `NamespaceRequested` only if the user is still `NoNamespace` and no
    /// other user holds the slug. Fails with `Duplicate` otherwise.
    async fn assign_namespace(&self, email: &str, namespace: &str) -> Result<UserRecord>;

    /// Guarded forward move: a user already at or past `to` is returned unchanged.
    async fn advance_status(&self, email: &str, to: NamespaceStatus) -> Result<UserRecord>;

    /// Caches `config` unless one is already cached; returns the cached blob.
    async fn store_config(&self, email: &str, config: &str) -> Result<String>;
}

/// Append-only history of orchestrator node lists.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SnapshotRepo: Send + Sync {
    /// Deactivates the current active snapshot and stores `snapshot` as the
    /// new active one in a single transition.
    async fn rotate(&self, snapshot: NodeListSnapshot) -> Result<()>;

    async fn active(&self) -> Result<Option<NodeListSnapshot>>;

    /// Most recent first.
    async fn history(&self, limit: usize) -> Result<Vec<NodeListSnapshot>>;
}

/// External DNS host-record store. Writes replace the whole list.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn get_host_records(&self, zone: &str) -> std::result::Result<Vec<DnsHostRecord>, RemoteError>;

    async fn set_host_records(
        &self,
        zone: &str,
        records: &[DnsHostRecord],
    ) -> std::result::Result<(), RemoteError>;
}

/// Live cluster membership as seen by the orchestrator.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NodeStatusSource: Send + Sync {
    async fn get_node_status(&self) -> std::result::Result<Vec<NodeStatus>, RemoteError>;
}

/// Head-node provisioning endpoint.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait HeadNode: Send + Sync {
    /// Idempotent on the head node: asking twice for the same slug is harmless.
    async fn create_namespace(&self, namespace: &str) -> std::result::Result<NamespaceAck, RemoteError>;

    /// `Ok(None)` when the head node has no configuration for `namespace` yet.
    async fn fetch_config(&self, namespace: &str) -> std::result::Result<Option<String>, RemoteError>;

    /// Short-lived token a new node uses to join the cluster.
    async fn fetch_join_secret(&self) -> std::result::Result<String, RemoteError>;
}
