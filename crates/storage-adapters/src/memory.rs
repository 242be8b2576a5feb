//! # In-memory stores
//!
//! Process-local implementations of the repositories. Reads go straight to the
//! `DashMap`; every check-then-act write holds the store's writer lock so the
//! uniqueness invariants hold under concurrent callers.

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{
    DomainError, Insertion, NamespaceStatus, NodeFilter, NodeListSnapshot, NodeRecord, NodeRepo,
    ProfileUpdate, Result, SnapshotRepo, UserRecord, UserRepo,
};
use tokio::sync::{Mutex, RwLock};

/// Node records keyed by lower-cased name.
#[derive(Default)]
pub struct MemoryNodeRepo {
    nodes: DashMap<String, NodeRecord>,
    writer: Mutex<()>,
}

impl MemoryNodeRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepo for MemoryNodeRepo {
    async fn insert_unique(&self, record: NodeRecord) -> Result<Insertion> {
        let _guard = self.writer.lock().await;

        let key = record.name.to_ascii_lowercase();
        if let Some(existing) = self.nodes.get(&key) {
            return if existing.address == record.address {
                Ok(Insertion::Existing(existing.clone()))
            } else {
                Err(DomainError::Duplicate(format!(
                    "node name {} is already registered at {}",
                    record.name, existing.address
                )))
            };
        }
        if let Some(holder) = self.nodes.iter().find(|n| n.address == record.address) {
            return Err(DomainError::Duplicate(format!(
                "address {} is already registered to node {}",
                record.address,
                holder.name
            )));
        }

        self.nodes.insert(key, record.clone());
        Ok(Insertion::Inserted(record))
    }

    async fn delete(&self, filter: &NodeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Ok(0);
        }
        let _guard = self.writer.lock().await;
        let before = self.nodes.len();
        self.nodes.retain(|_, node| !filter.matches(node));
        Ok((before - self.nodes.len()) as u64)
    }

    async fn find(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| filter.matches(n.value()))
            .map(|n| n.value().clone())
            .collect())
    }

    async fn set_ready(&self, name: &str, ready: bool) -> Result<bool> {
        match self.nodes.get_mut(&name.to_ascii_lowercase()) {
            Some(mut node) => {
                node.ready = ready;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Users keyed by case-folded email.
#[derive(Default)]
pub struct MemoryUserRepo {
    users: DashMap<String, UserRecord>,
    writer: Mutex<()>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(email: &str) -> DomainError {
        DomainError::NotFound(format!("user {email}"))
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.get(email).map(|u| u.clone()))
    }

    async fn insert_if_absent(&self, record: UserRecord) -> Result<UserRecord> {
        Ok(self.users.entry(record.email.clone()).or_insert(record).clone())
    }

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<Option<UserRecord>> {
        Ok(self.users.get_mut(email).map(|mut user| {
            if let Some(agreed) = update.agreed_to_terms {
                user.agreed_to_terms = agreed;
            }
            if let Some(approved) = update.approved {
                user.approved = approved;
            }
            if let Some(admin) = update.is_administrator {
                user.is_administrator = admin;
            }
            user.clone()
        }))
    }

    async fn list_by_status(&self, status: NamespaceStatus) -> Result<Vec<UserRecord>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.namespace_status == status)
            .map(|u| u.value().clone())
            .collect())
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<UserRecord>> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.namespace.as_deref() == Some(namespace))
            .map(|u| u.value().clone())
            .collect())
    }

    async fn assign_namespace(&self, email: &str, namespace: &str) -> Result<UserRecord> {
        let _guard = self.writer.lock().await;

        let taken = self
            .users
            .iter()
            .any(|u| u.email != email && u.namespace.as_deref() == Some(namespace));
        if taken {
            return Err(DomainError::Duplicate(format!("namespace {namespace} is already assigned")));
        }

        let mut user = self.users.get_mut(email).ok_or_else(|| Self::not_found(email))?;
        if user.namespace_status != NamespaceStatus::NoNamespace {
            return Err(DomainError::Duplicate(format!(
                "user {email} already holds namespace {}",
                user.namespace.as_deref().unwrap_or_default()
            )));
        }
        user.namespace = Some(namespace.to_string());
        user.namespace_status = NamespaceStatus::NamespaceRequested;
        Ok(user.clone())
    }

    async fn advance_status(&self, email: &str, to: NamespaceStatus) -> Result<UserRecord> {
        let mut user = self.users.get_mut(email).ok_or_else(|| Self::not_found(email))?;
        if user.namespace_status < to {
            user.namespace_status = to;
        }
        Ok(user.clone())
    }

    async fn store_config(&self, email: &str, config: &str) -> Result<String> {
        let mut user = self.users.get_mut(email).ok_or_else(|| Self::not_found(email))?;
        if user.config.is_none() {
            user.config = Some(config.to_string());
            user.has_config = true;
        }
        Ok(user.config.clone().unwrap_or_default())
    }
}

/// Snapshot history, oldest first.
#[derive(Default)]
pub struct MemorySnapshotRepo {
    snapshots: RwLock<Vec<NodeListSnapshot>>,
}

impl MemorySnapshotRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepo for MemorySnapshotRepo {
    async fn rotate(&self, mut snapshot: NodeListSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        for previous in snapshots.iter_mut().filter(|s| s.active) {
            previous.active = false;
        }
        snapshot.active = true;
        snapshots.push(snapshot);
        Ok(())
    }

    async fn active(&self) -> Result<Option<NodeListSnapshot>> {
        Ok(self.snapshots.read().await.iter().rev().find(|s| s.active).cloned())
    }

    async fn history(&self, limit: usize) -> Result<Vec<NodeListSnapshot>> {
        Ok(self.snapshots.read().await.iter().rev().take(limit).cloned().collect())
    }
}
