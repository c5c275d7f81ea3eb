use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use vigil::config::{self, Config};
use vigil::health::{AdjustableProbe, Executor, Report, RunOptions, Status, TagFilter};
use vigil::metrics::start_metrics_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = load_or_default_config();

    let executor = Arc::new(Executor::new(config.executor_settings()));

    for probe_config in &config.probes {
        let descriptor = probe_config.descriptor()?;
        let probe = AdjustableProbe::with_status(probe_config.status, probe_config.message());
        executor.register(descriptor, Arc::new(probe))?;
    }
    info!(
        probes = executor.len(),
        scheduled = executor.scheduled(),
        "Probes registered"
    );

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(&addr).await {
                error!(addr = %addr, error = %e, "Metrics server failed");
            }
        });
    }

    let shutdown = CancellationToken::new();
    let report_task = tokio::spawn(report_loop(
        executor.clone(),
        config.report.filter()?,
        config.report.interval(),
        shutdown.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();
    executor.shutdown();
    report_task.await?;

    info!("Vigil stopped");
    Ok(())
}

/// Periodically run the probes matching `filter` and log the report
async fn report_loop(
    executor: Arc<Executor>,
    filter: TagFilter,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_status: Option<Status> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let report = executor.run_with(&filter, RunOptions::default()).await;
                log_report(&report, last_status);
                last_status = Some(report.status());
            }
        }
    }
}

fn log_report(report: &Report, last_status: Option<Status>) {
    if last_status != Some(report.status()) {
        info!(status = %report.status(), probes = report.len(), "Overall status");
    }
    for entry in report.entries().iter().filter(|e| !e.status().is_ok()) {
        warn!(
            probe = %entry.name(),
            status = %entry.status(),
            result = %entry.result,
            "Probe not OK"
        );
    }
}

fn load_or_default_config() -> Config {
    // Try to load from config file
    let config_paths = ["config/vigil.toml", "vigil.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}
