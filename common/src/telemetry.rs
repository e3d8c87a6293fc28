// Telemetry module for structured logging and delivery metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize structured logging with JSON formatting
///
/// `RUST_LOG` takes precedence over `log_level` when set.
pub fn init_logging(log_level: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(json_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, "Structured logging initialized");
    Ok(())
}

/// Initialize the Prometheus metrics exporter and describe all metrics
pub fn init_metrics(metrics_port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", metrics_port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid metrics port: {}", e))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_counter!(
        "delivery_attempts_total",
        "Total number of individual push attempts"
    );
    describe_counter!(
        "delivery_success_total",
        "Total number of subscriptions delivered successfully"
    );
    describe_counter!(
        "delivery_failed_total",
        "Total number of subscriptions that failed after all retries"
    );
    describe_histogram!(
        "delivery_duration_seconds",
        "Duration of the final push attempt of a delivery"
    );
    describe_counter!("scene_cache_hits_total", "Scene payloads served from cache");
    describe_counter!(
        "scene_cache_misses_total",
        "Scene payloads fetched from their data source"
    );
    describe_gauge!("scheduled_jobs_active", "Number of active cron jobs");

    tracing::info!(
        metrics_port = metrics_port,
        metrics_endpoint = format!("http://0.0.0.0:{}/metrics", metrics_port),
        "Prometheus metrics exporter initialized"
    );

    Ok(())
}

#[inline]
pub fn record_delivery_attempt(target_type: &str, ok: bool) {
    counter!(
        "delivery_attempts_total",
        "target_type" => target_type.to_string(),
        "outcome" => if ok { "ok" } else { "failed" }
    )
    .increment(1);
}

/// Record the terminal outcome of one subscription delivery
#[inline]
pub fn record_delivery_outcome(scene: &str, ok: bool, duration_seconds: f64) {
    if ok {
        counter!("delivery_success_total", "scene" => scene.to_string()).increment(1);
    } else {
        counter!("delivery_failed_total", "scene" => scene.to_string()).increment(1);
    }
    histogram!("delivery_duration_seconds", "scene" => scene.to_string()).record(duration_seconds);
}

#[inline]
pub fn record_cache_lookup(scene: &str, hit: bool) {
    if hit {
        counter!("scene_cache_hits_total", "scene" => scene.to_string()).increment(1);
    } else {
        counter!("scene_cache_misses_total", "scene" => scene.to_string()).increment(1);
    }
}

#[inline]
pub fn update_active_jobs(count: usize) {
    gauge!("scheduled_jobs_active").set(count as f64);
}
