//! DoS Sentinel - seasonal traffic anomaly detector
//!
//! This binary accepts periodic per-resource measurements, forecasts each
//! one with Holt-Winters and flags ticks that exceed the confidence band.

use anyhow::{Context, Result};
use sentinel_lib::{
    forecast::SeasonClock,
    health::{components, HealthRegistry},
    observability::{SentinelMetrics, StructuredLogger},
    orchestrator::{ForecastStepOrchestrator, TickDispatcher},
    store::{InMemoryReportStore, InMemoryResourceRegistry, ReportStore, ResourceRegistry},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting dos-sentinel");

    let config = config::SentinelConfig::load()?;

    // Invalid smoothing parameters would make every forecast meaningless
    let params = config
        .forecast_parameters()
        .context("invalid forecasting parameters")?;
    info!(
        instance = %config.instance_name,
        alpha = params.alpha(),
        beta = params.beta(),
        gamma = params.gamma(),
        teta = params.teta(),
        season_length = params.season_length_samples(),
        "Sentinel configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::INTAKE).await;
    health_registry.register(components::FORECASTER).await;
    health_registry.register(components::STORE).await;

    let metrics = SentinelMetrics::new();

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(
        SENTINEL_VERSION,
        params.season_length_samples(),
        params.sample_interval_seconds(),
    );

    let reports: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
    let resources: Arc<dyn ResourceRegistry> = Arc::new(InMemoryResourceRegistry::new());

    let mut orchestrator =
        ForecastStepOrchestrator::new(params, reports.clone()).with_logger(logger.clone());
    if let Some(timeout) = config.store_timeout() {
        orchestrator = orchestrator.with_store_timeout(timeout);
    }

    let dispatcher = Arc::new(
        TickDispatcher::new(Arc::new(orchestrator))
            .with_queue_depth(config.worker_queue_depth)
            .with_idle_timeout(config.worker_idle_timeout()),
    );

    let app_state = Arc::new(api::AppState {
        health_registry: health_registry.clone(),
        metrics,
        dispatcher: dispatcher.clone(),
        reports,
        resources,
        clock: SeasonClock::new(&params),
    });

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    health_registry.set_ready(false).await;
    dispatcher.shutdown();
    info!("Shutting down");

    Ok(())
}
