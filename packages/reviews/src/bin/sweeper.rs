//! Standalone deadline sweeper process.
//!
//! Runs the periodic claim-timeout / auto-accept / elaboration-expiry sweeps
//! against the shared database. Safe to run alongside API instances (and
//! alongside another sweeper): all serialization happens through row locks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use reviews_core::domains::reviews::{
    start_sweeper, DeadlineSweeper, TracingEscrowBridge, TracingNotifier,
};
use reviews_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let sweeper = DeadlineSweeper::new(
        pool,
        Arc::new(TracingEscrowBridge),
        Arc::new(TracingNotifier),
    )
    .with_batch_size(config.sweep_batch_size);

    let mut scheduler =
        start_sweeper(sweeper, Duration::from_secs(config.sweep_interval_secs)).await?;

    info!("sweeper running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await.ok();
    Ok(())
}
