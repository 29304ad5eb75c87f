//! offcast gateway entry point.
//!
//! Boots the worker (install then activate), starts the periodic cache
//! janitor and sync drain, and serves the interception surface. Logging
//! goes to stderr as JSON.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, web};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

use offcast_core::{AppConfig, CacheDb};
use offcast_worker::Worker;

mod error;
mod routes;

/// Stale API entries are swept every 10 minutes; the freshness window
/// itself comes from configuration.
const JANITOR_INTERVAL: Duration = Duration::from_secs(600);

/// Deferred actions are retried every minute; per-action backoff decides
/// which of them are actually due.
const SYNC_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cfg = AppConfig::load()?;
    tracing::info!(
        listen = %cfg.listen_addr,
        upstream = %cfg.upstream,
        version = %cfg.current_cache(),
        "starting offcast gateway"
    );

    let cache = CacheDb::open(&cfg.db_path).await?;
    let worker = Arc::new(Worker::new(&cfg, cache)?);

    // Install is atomic over the critical set; a failure here aborts the
    // upgrade and leaves any previously running deploy untouched.
    worker.start().await?;

    spawn_janitor(worker.clone());
    spawn_sync_drain(worker.clone());

    let state = web::Data::new(routes::GatewayState::new(worker, &cfg)?);
    let listen = cfg.listen_addr.clone();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(routes::control_scope())
            .default_service(web::route().to(routes::intercept))
    })
    .bind(&listen)?
    .run()
    .await?;

    Ok(())
}

fn spawn_janitor(worker: Arc<Worker>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(JANITOR_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            if let Err(e) = worker.clean_cache().await {
                tracing::warn!("cache janitor failed: {e}");
            }
        }
    });
}

fn spawn_sync_drain(worker: Arc<Worker>) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SYNC_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            match worker.sync_now().await {
                Ok(report) if report.replayed + report.retried + report.dropped > 0 => {
                    tracing::info!(
                        replayed = report.replayed,
                        retried = report.retried,
                        dropped = report.dropped,
                        "background sync pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("background sync failed: {e}"),
            }
        }
    });
}
