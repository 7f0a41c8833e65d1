//! Metrics collection and exposition.
//!
//! # Metrics
//! - `sentinel_probe_total` (counter): probes by service and resulting state
//! - `sentinel_probe_latency_ms` (histogram): probe round-trip latency
//! - `sentinel_service_up` (gauge): 1=online/degraded, 0=offline/error
//! - `sentinel_status_published_total` (counter): published changes by origin
//! - `sentinel_provider_attempts_total` (counter): provider attempts by outcome
//! - `sentinel_provider_cooldown` (gauge): 1=in cooldown, 0=eligible
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when the exporter is disabled.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::state::ServiceState;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished (or skipped) probe.
pub fn record_probe(service: &str, state: ServiceState, latency: Option<Duration>) {
    metrics::counter!(
        "sentinel_probe_total",
        "service" => service.to_string(),
        "state" => state.as_str()
    )
    .increment(1);

    if let Some(latency) = latency {
        metrics::histogram!("sentinel_probe_latency_ms", "service" => service.to_string())
            .record(latency.as_secs_f64() * 1000.0);
    }

    metrics::gauge!("sentinel_service_up", "service" => service.to_string())
        .set(if state.is_up() { 1.0 } else { 0.0 });
}

/// Record a status change fanned out by the monitor.
pub fn record_status_published(service: &str, origin: &'static str) {
    metrics::counter!(
        "sentinel_status_published_total",
        "service" => service.to_string(),
        "origin" => origin
    )
    .increment(1);
}

/// Record one provider attempt (`success`, `empty`, `error`, `timeout`, `cancelled`).
pub fn record_provider_attempt(provider: &str, outcome: &'static str) {
    metrics::counter!(
        "sentinel_provider_attempts_total",
        "provider" => provider.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record whether a provider is currently cooling down.
pub fn record_provider_cooldown(provider: &str, in_cooldown: bool) {
    metrics::gauge!("sentinel_provider_cooldown", "provider" => provider.to_string())
        .set(if in_cooldown { 1.0 } else { 0.0 });
}
