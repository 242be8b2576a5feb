//! # Settings
//!
//! Layered configuration for the sundew binaries. Sources, lowest precedence
//! first:
//!
//! 1. built-in defaults
//! 2. `sundew.toml` (or the file named by `SUNDEW_CONFIG`), if present
//! 3. `SUNDEW__SECTION__KEY` environment variables, `.env` included
//!
//! The database URL is held as a `SecretString` so it never lands in logs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "sundew.toml";
pub const CONFIG_PATH_VAR: &str = "SUNDEW_CONFIG";
const ENV_PREFIX: &str = "SUNDEW";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub dns: DnsSettings,
    pub head_node: HeadNodeSettings,
    pub registry: RegistrySettings,
    pub retry: RetrySettings,
    pub reconcile: ReconcileSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// e.g. `sqlite://sundew.db` or `sqlite::memory:`
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DnsSettings {
    pub zone: String,
    /// Appended to a node name to form its host label; empty means the bare name.
    ///
    /// With an empty suffix every `A` record whose label is a valid node name
    /// (`www`, `head`, ...) is treated as a node record, and the first sync
    /// removes any that are not registered. Share a zone only with a suffix.
    #[serde(default)]
    pub managed_suffix: String,
    /// JSON zone file; when unset, zones live in memory.
    #[serde(default)]
    pub zone_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadNodeSettings {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl DnsSettings {
    /// True when sync owns every plain `A` label in the zone.
    pub fn claims_every_a_record(&self) -> bool {
        self.managed_suffix.is_empty()
    }
}

impl HeadNodeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    /// Accept private/reserved IPv4 addresses for nodes (lab deployments).
    pub allow_private_addresses: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    None,
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: BackoffKind,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileSettings {
    /// Seconds between scheduled passes; 0 disables the tick.
    pub interval_secs: u64,
}

impl ReconcileSettings {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Settings {
    /// Loads `.env`, then the layered sources, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let file = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_sources(Some(Path::new(&file)), None)
    }

    /// `env` replaces the process environment when given.
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://sundew.db")?
            .set_default("database.max_connections", 5)?
            .set_default("dns.zone", "edge-net.io")?
            .set_default("dns.managed_suffix", "")?
            .set_default("head_node.base_url", "http://localhost:8888/")?
            .set_default("head_node.timeout_secs", 10)?
            .set_default("registry.allow_private_addresses", false)?
            .set_default("retry.max_attempts", 2)?
            .set_default("retry.delay_ms", 0)?
            .set_default("retry.backoff", "none")?
            .set_default("retry.max_delay_ms", 5_000)?
            .set_default("reconcile.interval_secs", 0)?
            .set_default("log.level", "info")?
            .set_default("log.format", "text")?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.dns.zone.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "dns.zone", reason: "must not be empty".into() });
        }
        let url = url::Url::parse(&self.head_node.base_url).map_err(|e| ConfigError::Invalid {
            field: "head_node.base_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "head_node.base_url",
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::from_sources(None, env(&[])).unwrap();
        assert_eq!(settings.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.backoff, BackoffKind::None);
        assert_eq!(settings.reconcile.interval(), None);
        assert_eq!(settings.log.format, LogFormat::Text);
        assert!(settings.dns.zone_file.is_none());
        assert!(settings.dns.claims_every_a_record());
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[dns]\nzone = \"lab.example\"\nmanaged_suffix = \"-edge\"\n\n[reconcile]\ninterval_secs = 60"
        )
        .unwrap();

        let settings = Settings::from_sources(
            Some(file.path()),
            env(&[
                ("SUNDEW__DNS__ZONE", "prod.example"),
                ("SUNDEW__DATABASE__URL", "sqlite::memory:"),
                ("SUNDEW__RETRY__BACKOFF", "exponential"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.dns.zone, "prod.example");
        assert_eq!(settings.dns.managed_suffix, "-edge");
        assert!(!settings.dns.claims_every_a_record());
        assert_eq!(settings.reconcile.interval(), Some(Duration::from_secs(60)));
        assert_eq!(settings.retry.backoff, BackoffKind::Exponential);
        assert_eq!(settings.database.url.expose_secret(), "sqlite::memory:");
    }

    #[test]
    fn database_url_is_redacted_in_debug_output() {
        let settings =
            Settings::from_sources(None, env(&[("SUNDEW__DATABASE__URL", "sqlite://secret-path.db")]))
                .unwrap();
        assert!(!format!("{settings:?}").contains("secret-path"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value, field) in [
            ("SUNDEW__RETRY__MAX_ATTEMPTS", "0", "retry.max_attempts"),
            ("SUNDEW__DNS__ZONE", " ", "dns.zone"),
            ("SUNDEW__HEAD_NODE__BASE_URL", "not a url", "head_node.base_url"),
            ("SUNDEW__HEAD_NODE__BASE_URL", "ftp://head/", "head_node.base_url"),
        ] {
            match Settings::from_sources(None, env(&[(key, value)])) {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("{key}={value:?} gave {other:?}"),
            }
        }
    }
}
