//! Seeds the SQLite store with an administrator.
//!
//! Usage: `seed <email>` (or `SUNDEW_ADMIN_EMAIL`). The user is created if
//! missing and marked approved, terms-accepted and administrator. Re-running
//! is harmless.

use anyhow::{bail, Context};
use configs::Settings;
use domains::{fold_email, ProfileUpdate, UserRecord, UserRepo};
use secrecy::ExposeSecret;
use storage_adapters::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let email = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SUNDEW_ADMIN_EMAIL").ok())
        .map(|e| fold_email(&e))
        .unwrap_or_default();
    if !email.contains('@') {
        bail!("usage: seed <admin-email>");
    }

    let settings = Settings::load().context("loading settings")?;
    let store = SqliteStore::new(settings.database.url.expose_secret(), 1)
        .await
        .context("opening sqlite store")?;

    store.insert_if_absent(UserRecord::new(email.clone())).await?;
    let update = ProfileUpdate {
        agreed_to_terms: Some(true),
        approved: Some(true),
        is_administrator: Some(true),
    };
    let user = store
        .update_profile(&email, update)
        .await?
        .context("administrator vanished after insert")?;

    info!(email = %user.email, status = ?user.namespace_status, "administrator seeded");
    Ok(())
}
