// Scheduler binary entry point

use anyhow::{anyhow, Context, Result};
use common::bootstrap;
use common::config::Settings;
use common::telemetry;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    telemetry::init_logging(&settings.observability.log_level)?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!(
        redis_url = %settings.redis.url,
        timezone = %settings.scheduler.timezone,
        data_sources = settings.data_sources.len(),
        "Starting FSF scene scheduler"
    );

    let db_pool = bootstrap::init_database_pool(&settings).await?;
    let cache = bootstrap::init_cache_store(&settings).await?;
    let engine = bootstrap::build_engine(&settings, db_pool.clone(), cache)?;

    bootstrap::register_configured_sources(&engine, &settings).await?;

    let registered = engine
        .init_scheduler()
        .await
        .context("Failed to load cron subscriptions")?;
    info!(registered = registered, "Scheduler running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Received shutdown signal, stopping scheduled jobs");

    engine.shutdown().await;
    db_pool.close().await;

    info!("Scheduler stopped");
    Ok(())
}
