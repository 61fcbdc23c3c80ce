//! batwatchd - Batman-adv self-healing daemon

use anyhow::{Context, Result};
use batwatchd::mapek::MapekLoop;
use batwatchd::{
    BatctlHealthMonitor, BatctlMetricsCollector, Config, LoopConfig, LoopKey, LoopMetrics,
    LoopRegistry, SystemCommandRunner,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    batwatchd::init_logging(&config.log_level);

    info!("[BOOT] batwatchd v{} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "[BOOT] node={} interface={} interval={}s auto_heal={}",
        config.node_id, config.interface, config.cycle_interval_secs, config.auto_heal
    );

    let metrics = if config.metrics_enabled {
        Some(LoopMetrics::new().context("Failed to register loop metrics")?)
    } else {
        None
    };

    let registry = LoopRegistry::new();
    let key = LoopKey::new(config.node_id.clone(), config.interface.as_str())?;
    let mapek = registry
        .get_or_create(key, |_| build_loop(&config, metrics.clone()))
        .await
        .context("Failed to build MAPE-K loop")?;

    mapek
        .initialize()
        .await
        .context("Failed to initialize monitoring")?;

    let worker = {
        let mapek = Arc::clone(&mapek);
        tokio::spawn(async move { mapek.start().await })
    };
    info!("[BOOT] batwatchd ready");

    wait_for_shutdown().await?;
    info!("Shutting down gracefully");

    registry.shutdown().await;
    if let Err(e) = worker.await {
        warn!("MAPE-K worker ended abnormally: {}", e);
    }

    let status = mapek.status().await;
    info!(
        "Completed {} cycles, {} incidents recorded",
        status.cycle_count, status.knowledge_stats.incidents_recorded
    );
    if let Some(metrics) = &metrics {
        match metrics.gather_text() {
            Ok(text) => debug!("Final metrics:\n{}", text),
            Err(e) => warn!("Failed to render metrics: {}", e),
        }
    }

    Ok(())
}

fn build_loop(
    config: &Config,
    metrics: Option<LoopMetrics>,
) -> Result<MapekLoop, batwatch_common::ValidationError> {
    let runner = Arc::new(SystemCommandRunner::new());
    let probe_timeout = config.commands.probe_timeout();

    let health = BatctlHealthMonitor::new(
        config.node_id.clone(),
        config.interface.clone(),
        runner.clone(),
        probe_timeout,
    );
    let collector = BatctlMetricsCollector::new(
        config.node_id.clone(),
        config.interface.clone(),
        runner.clone(),
        probe_timeout,
    );

    let mapek = MapekLoop::new(
        LoopConfig::from(config),
        Arc::new(health),
        Arc::new(collector),
        runner,
    )?;
    Ok(match metrics {
        Some(metrics) => mapek.with_metrics(metrics),
        None => mapek,
    })
}

/// Resolves on Ctrl-C or SIGTERM
async fn wait_for_shutdown() -> Result<()> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
