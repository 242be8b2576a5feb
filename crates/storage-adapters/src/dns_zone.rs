//! # DNS zone stores
//!
//! `DnsProvider` implementations that keep host records locally instead of at
//! a hosted registrar. Both replace a zone's record set wholesale on write,
//! which is the contract the synchronizer relies on.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{DnsHostRecord, DnsProvider, RemoteError};

/// Zones held in process memory. Can be switched into an unreachable state to
/// exercise the synchronizer's failure paths.
#[derive(Default)]
pub struct MemoryDnsZone {
    zones: DashMap<String, Vec<DnsHostRecord>>,
    unreachable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryDnsZone {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(zone: &str, records: Vec<DnsHostRecord>) -> Self {
        let store = Self::default();
        store.zones.insert(zone.to_string(), records);
        store
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of successful `set_host_records` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn records(&self, zone: &str) -> Vec<DnsHostRecord> {
        self.zones.get(zone).map(|r| r.clone()).unwrap_or_default()
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unreachable("in-memory zone is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DnsProvider for MemoryDnsZone {
    async fn get_host_records(&self, zone: &str) -> Result<Vec<DnsHostRecord>, RemoteError> {
        self.check_reachable()?;
        Ok(self.records(zone))
    }

    async fn set_host_records(&self, zone: &str, records: &[DnsHostRecord]) -> Result<(), RemoteError> {
        self.check_reachable()?;
        self.zones.insert(zone.to_string(), records.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(feature = "dns-local")]
pub use local::LocalZoneFile;

#[cfg(feature = "dns-local")]
mod local {
    use std::collections::BTreeMap;
    use std::io::ErrorKind;
    use std::path::PathBuf;

    use async_trait::async_trait;
    use domains::{DnsHostRecord, DnsProvider, RemoteError};
    use tokio::fs;
    use tokio::sync::Mutex;
    use tracing::debug;

    type Zones = BTreeMap<String, Vec<DnsHostRecord>>;

    /// All zones in one JSON document, `{ "<zone>": [records...] }`.
    /// Writes go to a sibling temp file and are renamed into place so a reader
    /// never observes a half-written zone.
    pub struct LocalZoneFile {
        path: PathBuf,
        lock: Mutex<()>,
    }

    impl LocalZoneFile {
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into(), lock: Mutex::new(()) }
        }

        async fn load(&self) -> Result<Zones, RemoteError> {
            match fs::read(&self.path).await {
                Ok(bytes) if bytes.is_empty() => Ok(Zones::new()),
                Ok(bytes) => serde_json::from_slice(&bytes)
                    .map_err(|e| RemoteError::Malformed(format!("{}: {e}", self.path.display()))),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(Zones::new()),
                Err(e) => Err(RemoteError::Unreachable(format!("{}: {e}", self.path.display()))),
            }
        }
    }

    #[async_trait]
    impl DnsProvider for LocalZoneFile {
        async fn get_host_records(&self, zone: &str) -> Result<Vec<DnsHostRecord>, RemoteError> {
            Ok(self.load().await?.remove(zone).unwrap_or_default())
        }

        async fn set_host_records(&self, zone: &str, records: &[DnsHostRecord]) -> Result<(), RemoteError> {
            let _guard = self.lock.lock().await;
            let mut zones = self.load().await?;
            zones.insert(zone.to_string(), records.to_vec());

            let body = serde_json::to_vec_pretty(&zones)
                .map_err(|e| RemoteError::Rejected(e.to_string()))?;
            let tmp = self.path.with_extension("tmp");
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
            }
            fs::write(&tmp, body)
                .await
                .map_err(|e| RemoteError::Unreachable(format!("{}: {e}", tmp.display())))?;
            fs::rename(&tmp, &self.path)
                .await
                .map_err(|e| RemoteError::Unreachable(format!("{}: {e}", self.path.display())))?;

            debug!(zone, records = records.len(), path = %self.path.display(), "zone file written");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_zone_replaces_whole_record_set() {
        let zone = MemoryDnsZone::with_records(
            "edge-net.io",
            vec![DnsHostRecord::a("old", "8.8.8.8".parse().unwrap())],
        );
        let fresh = vec![DnsHostRecord::a("new", "8.8.4.4".parse().unwrap())];
        zone.set_host_records("edge-net.io", &fresh).await.unwrap();
        assert_eq!(zone.get_host_records("edge-net.io").await.unwrap(), fresh);
        assert_eq!(zone.write_count(), 1);
    }

    #[tokio::test]
    async fn offline_zone_reports_unreachable() {
        let zone = MemoryDnsZone::new();
        zone.set_unreachable(true);
        let err = zone.get_host_records("edge-net.io").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[cfg(feature = "dns-local")]
    #[tokio::test]
    async fn zone_file_keeps_other_zones_intact() {
        let dir = tempfile::tempdir().unwrap();
        let file = LocalZoneFile::new(dir.path().join("zones.json"));

        assert!(file.get_host_records("a.io").await.unwrap().is_empty());

        let mx = DnsHostRecord {
            name: "@".into(),
            address: "mail.b.io".into(),
            record_type: "MX".into(),
            ttl: Some(300),
        };
        file.set_host_records("b.io", std::slice::from_ref(&mx)).await.unwrap();
        file.set_host_records("a.io", &[DnsHostRecord::a("n1", "8.8.8.8".parse().unwrap())])
            .await
            .unwrap();

        assert_eq!(file.get_host_records("b.io").await.unwrap(), vec![mx]);
        assert_eq!(file.get_host_records("a.io").await.unwrap().len(), 1);
    }

    #[cfg(feature = "dns-local")]
    #[tokio::test]
    async fn corrupt_zone_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zones.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = LocalZoneFile::new(path).get_host_records("a.io").await.unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }
}
