//! sundew/crates/storage-adapters/src/lib.rs
//!
//! Persistence adapters: in-memory and SQLite repositories, plus local DNS
//! zone stores. Backends beyond the in-memory ones sit behind cargo features.

pub mod dns_zone;
pub mod memory;

#[cfg(feature = "db-sqlite")]
pub mod sqlite;

// Re-exporting for easier access in other crates
pub use dns_zone::MemoryDnsZone;
pub use memory::{MemoryNodeRepo, MemorySnapshotRepo, MemoryUserRepo};

#[cfg(feature = "dns-local")]
pub use dns_zone::LocalZoneFile;

#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteStore;
