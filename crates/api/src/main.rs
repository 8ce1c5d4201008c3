//! Alert Engine - Main Entry Point
//!
//! Usage: `alert-engine [config.toml]` (or set `ALERT_ENGINE_CONFIG`).

use std::sync::Arc;

use alert_scheduler::{EscalationScheduler, RuleEvaluationScheduler, SchedulerHandle};
use alerting::{AlertEngine, EngineConfig};
use anyhow::Context;
use api::{init_logging, run_server, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ALERT_ENGINE_CONFIG").ok());
    let config = EngineConfig::load(config_path.as_deref()).context("loading configuration")?;

    init_logging(&config.logging);

    info!("=== Alert Engine v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration loaded from {}", path);
    }

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("installing Prometheus recorder")?;

    let engine = AlertEngine::with_log_notifier(config.clone());
    let state = Arc::new(AppState::new(engine.clone()).with_prometheus(prometheus));

    let schedulers = SchedulerHandle::spawn(
        RuleEvaluationScheduler::new(
            engine.clone(),
            state.metric_collector(),
            config.evaluation_interval(),
        ),
        EscalationScheduler::new(engine, config.escalation_interval()),
    );

    let served = run_server(state, &config.server.bind_address, shutdown_signal()).await;

    schedulers.shutdown().await;
    served.context("running API server")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
