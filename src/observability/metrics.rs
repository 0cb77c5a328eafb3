//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxyline_connections_total` (counter): accepted connections by
//!   `proxy_protocol` policy
//! - `proxyline_sniff_failures_total` (counter): rejected headers by `reason`
//! - `proxyline_sniff_duration_seconds` (histogram): time spent in the sniff
//!   phase for header-sniffing listeners
//! - `proxyline_active_connections` (gauge): current connection count
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the Prometheus exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_opened(proxy_protocol: bool) {
    metrics::counter!(
        "proxyline_connections_total",
        "proxy_protocol" => if proxy_protocol { "required" } else { "disabled" }
    )
    .increment(1);
    metrics::gauge!("proxyline_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("proxyline_active_connections").decrement(1.0);
}

pub fn record_sniff(started: Instant, failure: Option<&'static str>) {
    metrics::histogram!("proxyline_sniff_duration_seconds").record(started.elapsed().as_secs_f64());
    if let Some(reason) = failure {
        metrics::counter!("proxyline_sniff_failures_total", "reason" => reason).increment(1);
    }
}
