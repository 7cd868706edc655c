use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use slotd::api::{self, AppState};
use slotd::engine::Engine;
use slotd::notify::NotifyHub;
use slotd::reaper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("SLOTD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    slotd::observability::init(metrics_port);

    let port = std::env::var("SLOTD_PORT").unwrap_or_else(|_| "8080".into());
    let bind = std::env::var("SLOTD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("SLOTD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("SLOTD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let sweep_interval_secs: u64 = std::env::var("SLOTD_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let wal_path = PathBuf::from(&data_dir).join("slots.wal");
    let engine = Arc::new(Engine::new(wal_path, notify)?);

    tokio::spawn(reaper::run_sweeper(
        engine.clone(),
        Duration::from_secs(sweep_interval_secs),
    ));
    tokio::spawn(reaper::run_compactor(engine.clone(), compact_threshold));

    let state = Arc::new(AppState { engine });
    let app = api::router(state);

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("slotd listening on http://{addr}");
    info!("  data_dir: {data_dir}");
    info!("  sweep_interval: {sweep_interval_secs}s");
    info!(
        "  metrics: {}",
        metrics_port.map_or("disabled".to_string(), |p| format!(
            "http://0.0.0.0:{p}/metrics"
        ))
    );

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        info!("shutdown signal received");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("slotd stopped");
    Ok(())
}
