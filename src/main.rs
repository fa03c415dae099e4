//! Daemon entry point. Opens the engine (replaying the WAL), keeps the log
//! compacted in the background and compacts once more on shutdown. The
//! schedule and ranked-entity services are a library surface; the binary
//! exposes no transport of its own.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rosterd::config::Config;
use rosterd::engine::Engine;
use rosterd::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    rosterd::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.wal_path(), notify)?);

    let compactor = tokio::spawn(rosterd::compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    info!("rosterd started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  timezone: {}", config.timezone);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  retry: {} attempts, {:?} backoff",
        config.retry.attempts, config.retry.backoff
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Run until SIGTERM/ctrl-c
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::warn!("final compaction failed: {e}");
    }

    info!("rosterd stopped");
    Ok(())
}
