use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total service mutations. Labels: op, status.
pub const MUTATIONS_TOTAL: &str = "rosterd_mutations_total";

/// Histogram: mutation latency in seconds, retries included. Labels: op.
pub const MUTATION_DURATION_SECONDS: &str = "rosterd_mutation_duration_seconds";

/// Counter: rank commits refused because another writer got there first. Labels: kind.
pub const TX_CONFLICTS_TOTAL: &str = "rosterd_tx_conflicts_total";

/// Counter: occurrences materialized by the recurrence expander. Labels: repeat.
pub const OCCURRENCES_EXPANDED_TOTAL: &str = "rosterd_occurrences_expanded_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: items per ranked collection. Labels: kind.
pub const RANKED_ITEMS: &str = "rosterd_ranked_items";

/// Gauge: stored schedule rules.
pub const SCHEDULES_ACTIVE: &str = "rosterd_schedules_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rosterd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rosterd_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "rosterd_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Label for a service result.
pub fn status_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "ok" } else { "error" }
}
