//! # Sundew Binary
//!
//! Loads settings, installs logging, wires the adapters selected at compile
//! time, and serves the HTTP front door. With `reconcile.interval_secs` set,
//! a background tick runs reconciliation passes through the same lock the
//! `/reconcile` endpoint uses.

mod wiring;

use anyhow::Context;
use api_adapters::AppState;
use configs::{LogFormat, LogSettings, Settings};
use tokio::net::TcpListener;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn spawn_reconcile_tick(state: AppState, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let report = state.run_pass().await;
            if report.is_clean() {
                info!(
                    namespaces_created = report.namespaces_created.len(),
                    configs_cached = report.configs_cached.len(),
                    "scheduled pass finished"
                );
            } else {
                warn!(errors = report.errors.len(), "scheduled pass finished with errors\n{report}");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_logging(&settings.log);

    let state = wiring::build(&settings).await?;
    if let Some(period) = settings.reconcile.interval() {
        info!(every_secs = period.as_secs(), "scheduled reconciliation enabled");
        spawn_reconcile_tick(state.clone(), period);
    }

    let listener = TcpListener::bind(settings.server.bind_address())
        .await
        .with_context(|| format!("binding {}", settings.server.bind_address()))?;
    info!(address = %listener.local_addr()?, zone = %settings.dns.zone, "sundew listening");

    axum::serve(listener, api_adapters::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;
    Ok(())
}
