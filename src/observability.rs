use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: route, status.
pub const REQUESTS_TOTAL: &str = "slotd_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const REQUEST_DURATION_SECONDS: &str = "slotd_request_duration_seconds";

/// Counter: slots created by generation.
pub const SLOTS_GENERATED_TOTAL: &str = "slotd_slots_generated_total";

/// Counter: bookings created.
pub const BOOKINGS_TOTAL: &str = "slotd_bookings_total";

/// Counter: booking attempts rejected by a lost race or an exhausted
/// weekly cap.
pub const BOOKING_CONFLICTS_TOTAL: &str = "slotd_booking_conflicts_total";

/// Counter: transitions applied by the sweeper. Labels: kind.
pub const SWEEP_TRANSITIONS_TOTAL: &str = "slotd_sweep_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "slotd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "slotd_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
