//! # Domain Models
//!
//! The records owned by the reconciliation engine and the shapes exchanged
//! with its collaborators. Node snapshots use UUID v7 so history sorts by time.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Record type written for every managed DNS host record.
pub const A_RECORD: &str = "A";

/// A cluster-joined host known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// RFC1035 label, unique across the registry
    pub name: String,
    /// Public IPv4 address, unique across the registry
    pub address: Ipv4Addr,
    pub added_at: DateTime<Utc>,
    pub location: Option<Location>,
    /// Mutated only by the readiness reconciler
    pub ready: bool,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>, address: Ipv4Addr, location: Option<Location>) -> Self {
        Self {
            name: name.into(),
            address,
            added_at: Utc::now(),
            location,
            ready: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Where a node says it lives. Every part is optional; the portal fills in
/// whatever the request headers carried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub coordinates: Option<GeoPoint>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

/// Unvalidated input to `addNode`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub location: Option<Location>,
}

/// Optional filters shared by node lookup and deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFilter {
    pub name: Option<String>,
    pub address: Option<Ipv4Addr>,
}

impl NodeFilter {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), address: None }
    }

    pub fn by_address(address: Ipv4Addr) -> Self {
        Self { name: None, address: Some(address) }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.address.is_none()
    }

    pub fn matches(&self, record: &NodeRecord) -> bool {
        self.name.as_deref().map_or(true, |n| n.eq_ignore_ascii_case(&record.name))
            && self.address.map_or(true, |a| a == record.address)
    }
}

/// Result of a uniqueness-checked insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Inserted(NodeRecord),
    /// An identical `{name, address}` pair was already registered
    Existing(NodeRecord),
}

impl Insertion {
    pub fn into_record(self) -> NodeRecord {
        match self {
            Insertion::Inserted(r) | Insertion::Existing(r) => r,
        }
    }
}

/// A host record as held by the DNS provider. Unmanaged records are carried
/// through reconciliation untouched, so every field the provider reports lives here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DnsHostRecord {
    pub name: String,
    pub address: String,
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl DnsHostRecord {
    pub fn a(name: impl Into<String>, address: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            address: address.to_string(),
            record_type: A_RECORD.to_string(),
            ttl: None,
        }
    }

    pub fn is_a_record(&self) -> bool {
        self.record_type.eq_ignore_ascii_case(A_RECORD)
    }
}

/// Namespace provisioning state. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NamespaceStatus {
    NoNamespace,
    NamespaceRequested,
    NamespaceAssigned,
}

impl NamespaceStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            NamespaceStatus::NoNamespace => 0,
            NamespaceStatus::NamespaceRequested => 1,
            NamespaceStatus::NamespaceAssigned => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(NamespaceStatus::NoNamespace),
            1 => Some(NamespaceStatus::NamespaceRequested),
            2 => Some(NamespaceStatus::NamespaceAssigned),
            _ => None,
        }
    }
}

impl Default for NamespaceStatus {
    fn default() -> Self {
        NamespaceStatus::NoNamespace
    }
}

/// A portal user and the provisioning state of their namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Case-folded, unique
    pub email: String,
    /// Unique once assigned
    pub namespace: Option<String>,
    pub namespace_status: NamespaceStatus,
    pub agreed_to_terms: bool,
    pub approved: bool,
    pub is_administrator: bool,
    pub has_config: bool,
    /// Cached head-node configuration; immutable once stored
    #[serde(skip_serializing)]
    pub config: Option<String>,
}

impl UserRecord {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            namespace: None,
            namespace_status: NamespaceStatus::NoNamespace,
            agreed_to_terms: false,
            approved: false,
            is_administrator: false,
            has_config: false,
            config: None,
        }
    }
}

/// Partial update of the user-controlled flags. `None` leaves a flag alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub agreed_to_terms: Option<bool>,
    pub approved: Option<bool>,
    pub is_administrator: Option<bool>,
}

/// Node membership as last reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeListSnapshot {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    /// At most one snapshot is active at any moment
    pub active: bool,
    pub nodes: Vec<String>,
}

impl NodeListSnapshot {
    pub fn new_active(nodes: Vec<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            time: Utc::now(),
            active: true,
            nodes,
        }
    }
}

/// One entry of the orchestrator's node-status list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub hostname: String,
    pub ready: bool,
}

/// Head-node reply to a namespace creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceAck {
    Acknowledged,
    Failure { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

/// Reply to the head node's namespace confirmation callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub outcome: Outcome,
    pub reason: String,
}

impl Confirmation {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self { outcome: Outcome::Failure, reason: reason.into() }
    }
}
