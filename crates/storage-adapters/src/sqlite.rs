//! # SQLite Store
//!
//! Maps the SQLite relational model onto the domain records. Uniqueness is
//! enforced twice: a check inside the write transaction produces the precise
//! `Existing`/`Duplicate` answer, and UNIQUE indexes reject whatever a
//! concurrent writer slips past it.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use domains::{
    DomainError, Insertion, Location, NamespaceStatus, NodeFilter, NodeListSnapshot, NodeRecord,
    NodeRepo, ProfileUpdate, Result, SnapshotRepo, UserRecord, UserRepo,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    name        TEXT    NOT NULL COLLATE NOCASE,
    address     TEXT    NOT NULL,
    added_at    TEXT    NOT NULL,
    location    TEXT,
    ready       INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS nodes_name ON nodes (name);
CREATE UNIQUE INDEX IF NOT EXISTS nodes_address ON nodes (address);

CREATE TABLE IF NOT EXISTS users (
    email             TEXT    PRIMARY KEY NOT NULL,
    namespace         TEXT,
    namespace_status  INTEGER NOT NULL DEFAULT 0,
    agreed_to_terms   INTEGER NOT NULL DEFAULT 0,
    approved          INTEGER NOT NULL DEFAULT 0,
    is_administrator  INTEGER NOT NULL DEFAULT 0,
    has_config        INTEGER NOT NULL DEFAULT 0,
    config            TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS users_namespace ON users (namespace) WHERE namespace IS NOT NULL;

CREATE TABLE IF NOT EXISTS node_snapshots (
    id      BLOB    PRIMARY KEY NOT NULL,
    time    TEXT    NOT NULL,
    active  INTEGER NOT NULL DEFAULT 0,
    nodes   TEXT    NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS node_snapshots_active ON node_snapshots (active) WHERE active = 1
"#;

const USER_COLUMNS: &str = "email, namespace, namespace_status, agreed_to_terms, approved, \
                            is_administrator, has_config, config";

/// One pool backing all three repositories.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `url` and applies the schema.
    /// An in-memory URL is pinned to a single connection that never expires,
    /// since every new connection would see an empty database.
    pub async fn new(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await.map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        info!(in_memory, "sqlite store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    async fn user(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn require_user(&self, email: &str) -> Result<UserRecord> {
        self.user(email)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {email}")))
    }
}

fn db_err(err: sqlx::Error) -> DomainError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => DomainError::Duplicate(db.message().to_string()),
        _ => DomainError::storage(err),
    }
}

fn node_from_row(row: &SqliteRow) -> Result<NodeRecord> {
    let address: String = row.try_get("address").map_err(db_err)?;
    let location: Option<String> = row.try_get("location").map_err(db_err)?;
    Ok(NodeRecord {
        name: row.try_get("name").map_err(db_err)?,
        address: address
            .parse::<Ipv4Addr>()
            .map_err(|e| DomainError::storage(format!("stored address {address:?}: {e}")))?,
        added_at: row.try_get("added_at").map_err(db_err)?,
        location: location
            .map(|raw| serde_json::from_str::<Location>(&raw))
            .transpose()
            .map_err(DomainError::storage)?,
        ready: row.try_get("ready").map_err(db_err)?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<UserRecord> {
    let status: i64 = row.try_get("namespace_status").map_err(db_err)?;
    Ok(UserRecord {
        email: row.try_get("email").map_err(db_err)?,
        namespace: row.try_get("namespace").map_err(db_err)?,
        namespace_status: NamespaceStatus::from_i64(status)
            .ok_or_else(|| DomainError::storage(format!("unknown namespace status {status}")))?,
        agreed_to_terms: row.try_get("agreed_to_terms").map_err(db_err)?,
        approved: row.try_get("approved").map_err(db_err)?,
        is_administrator: row.try_get("is_administrator").map_err(db_err)?,
        has_config: row.try_get("has_config").map_err(db_err)?,
        config: row.try_get("config").map_err(db_err)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<NodeListSnapshot> {
    let nodes: String = row.try_get("nodes").map_err(db_err)?;
    Ok(NodeListSnapshot {
        id: row.try_get("id").map_err(db_err)?,
        time: row.try_get("time").map_err(db_err)?,
        active: row.try_get("active").map_err(db_err)?,
        nodes: serde_json::from_str(&nodes).map_err(DomainError::storage)?,
    })
}

#[async_trait]
impl NodeRepo for SqliteStore {
    async fn insert_unique(&self, record: NodeRecord) -> Result<Insertion> {
        let address = record.address.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let clashes = sqlx::query("SELECT * FROM nodes WHERE name = ? OR address = ?")
            .bind(&record.name)
            .bind(&address)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;
        if let Some(row) = clashes.first() {
            let existing = node_from_row(row)?;
            if clashes.len() == 1 && existing.name.eq_ignore_ascii_case(&record.name) && existing.address == record.address {
                return Ok(Insertion::Existing(existing));
            }
            return Err(DomainError::Duplicate(format!(
                "node {} at {} collides with registered node {} at {}",
                record.name, record.address, existing.name, existing.address
            )));
        }

        let location = record
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(DomainError::storage)?;
        sqlx::query("INSERT INTO nodes (name, address, added_at, location, ready) VALUES (?, ?, ?, ?, ?)")
            .bind(&record.name)
            .bind(&address)
            .bind(record.added_at)
            .bind(location)
            .bind(record.ready)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        debug!(node = %record.name, "node row inserted");
        Ok(Insertion::Inserted(record))
    }

    async fn delete(&self, filter: &NodeFilter) -> Result<u64> {
        if filter.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM nodes WHERE (?1 IS NULL OR name = ?1) AND (?2 IS NULL OR address = ?2)",
        )
        .bind(filter.name.as_deref())
        .bind(filter.address.map(|a| a.to_string()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn find(&self, filter: &NodeFilter) -> Result<Vec<NodeRecord>> {
        sqlx::query(
            "SELECT * FROM nodes WHERE (?1 IS NULL OR name = ?1) AND (?2 IS NULL OR address = ?2) \
             ORDER BY name",
        )
        .bind(filter.name.as_deref())
        .bind(filter.address.map(|a| a.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(node_from_row)
        .collect()
    }

    async fn set_ready(&self, name: &str, ready: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE nodes SET ready = ? WHERE name = ?")
            .bind(ready)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        self.user(email).await
    }

    async fn insert_if_absent(&self, record: UserRecord) -> Result<UserRecord> {
        sqlx::query(
            "INSERT INTO users (email, agreed_to_terms, approved, is_administrator) VALUES (?, ?, ?, ?) \
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&record.email)
        .bind(record.agreed_to_terms)
        .bind(record.approved)
        .bind(record.is_administrator)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        self.require_user(&record.email).await
    }

    async fn update_profile(&self, email: &str, update: ProfileUpdate) -> Result<Option<UserRecord>> {
        let result = sqlx::query(
            "UPDATE users SET \
               agreed_to_terms  = COALESCE(?, agreed_to_terms), \
               approved         = COALESCE(?, approved), \
               is_administrator = COALESCE(?, is_administrator) \
             WHERE email = ?",
        )
        .bind(update.agreed_to_terms)
        .bind(update.approved)
        .bind(update.is_administrator)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.user(email).await
    }

    async fn list_by_status(&self, status: NamespaceStatus) -> Result<Vec<UserRecord>> {
        sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE namespace_status = ? ORDER BY email"
        ))
        .bind(status.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(user_from_row)
        .collect()
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Vec<UserRecord>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE namespace = ?"))
            .bind(namespace)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn assign_namespace(&self, email: &str, namespace: &str) -> Result<UserRecord> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let holder: Option<String> =
            sqlx::query_scalar("SELECT email FROM users WHERE namespace = ? AND email <> ?")
                .bind(namespace)
                .bind(email)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        if holder.is_some() {
            return Err(DomainError::Duplicate(format!("namespace {namespace} is already assigned")));
        }

        let result = sqlx::query(
            "UPDATE users SET namespace = ?, namespace_status = ? \
             WHERE email = ? AND namespace_status = ?",
        )
        .bind(namespace)
        .bind(NamespaceStatus::NamespaceRequested.as_i64())
        .bind(email)
        .bind(NamespaceStatus::NoNamespace.as_i64())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        if result.rows_affected() == 0 {
            let user = self.require_user(email).await?;
            return Err(DomainError::Duplicate(format!(
                "user {email} already holds namespace {}",
                user.namespace.unwrap_or_default()
            )));
        }
        self.require_user(email).await
    }

    async fn advance_status(&self, email: &str, to: NamespaceStatus) -> Result<UserRecord> {
        sqlx::query("UPDATE users SET namespace_status = ? WHERE email = ? AND namespace_status < ?")
            .bind(to.as_i64())
            .bind(email)
            .bind(to.as_i64())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        self.require_user(email).await
    }

    async fn store_config(&self, email: &str, config: &str) -> Result<String> {
        sqlx::query("UPDATE users SET config = ?, has_config = 1 WHERE email = ? AND config IS NULL")
            .bind(config)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        let user = self.require_user(email).await?;
        Ok(user.config.unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotRepo for SqliteStore {
    async fn rotate(&self, snapshot: NodeListSnapshot) -> Result<()> {
        let nodes = serde_json::to_string(&snapshot.nodes).map_err(DomainError::storage)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("UPDATE node_snapshots SET active = 0 WHERE active = 1")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("INSERT INTO node_snapshots (id, time, active, nodes) VALUES (?, ?, 1, ?)")
            .bind(snapshot.id)
            .bind(snapshot.time)
            .bind(nodes)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn active(&self) -> Result<Option<NodeListSnapshot>> {
        let row = sqlx::query("SELECT * FROM node_snapshots WHERE active = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn history(&self, limit: usize) -> Result<Vec<NodeListSnapshot>> {
        sqlx::query("SELECT * FROM node_snapshots ORDER BY time DESC, id DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(snapshot_from_row)
            .collect()
    }
}
