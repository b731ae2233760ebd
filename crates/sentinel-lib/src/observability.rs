//! Observability infrastructure for the sentinel
//!
//! Provides:
//! - Prometheus metrics (tick latency, processed and aberrant ticks, store failures)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::models::{CyberReport, ResourceId};

/// Histogram buckets for tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SentinelMetricsInner> = OnceLock::new();

struct SentinelMetricsInner {
    tick_latency_seconds: Histogram,
    ticks_processed: IntCounter,
    aberrant_ticks: IntCounter,
    duplicate_ticks: IntCounter,
    store_errors: IntCounter,
    resources_monitored: IntGauge,
    active_workers: IntGauge,
}

impl SentinelMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "dos_sentinel_tick_latency_seconds",
                "Time spent resolving lags, forecasting and persisting one tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            ticks_processed: register_int_counter!(
                "dos_sentinel_ticks_processed_total",
                "Total number of forecasting ticks persisted"
            )
            .expect("Failed to register ticks_processed"),

            aberrant_ticks: register_int_counter!(
                "dos_sentinel_aberrant_ticks_total",
                "Total number of ticks flagged as aberrant behavior"
            )
            .expect("Failed to register aberrant_ticks"),

            duplicate_ticks: register_int_counter!(
                "dos_sentinel_duplicate_ticks_total",
                "Total number of ticks rejected because the tick already existed"
            )
            .expect("Failed to register duplicate_ticks"),

            store_errors: register_int_counter!(
                "dos_sentinel_store_errors_total",
                "Total number of failed or timed out store calls"
            )
            .expect("Failed to register store_errors"),

            resources_monitored: register_int_gauge!(
                "dos_sentinel_resources_monitored",
                "Number of registered monitored resources"
            )
            .expect("Failed to register resources_monitored"),

            active_workers: register_int_gauge!(
                "dos_sentinel_active_tick_workers",
                "Number of per-resource tick workers currently running"
            )
            .expect("Failed to register active_workers"),
        }
    }
}

/// Sentinel metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct SentinelMetrics {
    _private: (),
}

impl Default for SentinelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SentinelMetricsInner {
        GLOBAL_METRICS.get_or_init(SentinelMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    /// Count a persisted tick, and its aberrant flag if raised
    pub fn record_tick(&self, aberrant: bool) {
        self.inner().ticks_processed.inc();
        if aberrant {
            self.inner().aberrant_ticks.inc();
        }
    }

    pub fn inc_duplicate_ticks(&self) {
        self.inner().duplicate_ticks.inc();
    }

    pub fn inc_store_errors(&self) {
        self.inner().store_errors.inc();
    }

    pub fn set_resources_monitored(&self, count: i64) {
        self.inner().resources_monitored.set(count);
    }

    pub fn inc_active_workers(&self) {
        self.inner().active_workers.inc();
    }

    pub fn dec_active_workers(&self) {
        self.inner().active_workers.dec();
    }
}

/// Structured logger for sentinel events
///
/// Keeps the `event` field names stable so log pipelines can key on them.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a persisted tick
    pub fn log_tick(&self, report: &CyberReport, lags_present: usize) {
        debug!(
            event = "tick_processed",
            instance = %self.instance,
            report_id = report.id,
            resource_id = report.resource_id,
            season_index = report.season_index,
            actual_value = report.actual_value,
            baseline = report.forecast.baseline,
            linear_trend = report.forecast.linear_trend,
            seasonal_trend = report.forecast.seasonal_trend,
            estimated_value = report.forecast.estimated_value,
            deviation = report.forecast.weighted_avg_abs_deviation,
            band_upper = report.forecast.confidence_band_upper_value,
            lags_present = lags_present,
            "Forecasting tick persisted"
        );
    }

    /// Log a tick whose measurement exceeded the previous confidence band
    pub fn log_aberrant_behavior(&self, report: &CyberReport) {
        warn!(
            event = "aberrant_behavior",
            instance = %self.instance,
            report_id = report.id,
            resource_id = report.resource_id,
            season_index = report.season_index,
            actual_value = report.actual_value,
            estimated_value = report.forecast.estimated_value,
            "Traffic exceeded the expected range"
        );
    }

    /// Log a rejected attempt to recompute an existing tick
    pub fn log_duplicate_tick(&self, resource_id: ResourceId, season_index: i64) {
        error!(
            event = "duplicate_tick",
            instance = %self.instance,
            resource_id = resource_id,
            season_index = season_index,
            "Tick already exists, refusing to recompute"
        );
    }

    pub fn log_startup(&self, version: &str, season_length: i64, sample_interval_secs: i64) {
        info!(
            event = "sentinel_started",
            instance = %self.instance,
            version = %version,
            season_length = season_length,
            sample_interval_secs = sample_interval_secs,
            "DoS sentinel started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "sentinel_shutdown",
            instance = %self.instance,
            reason = %reason,
            "DoS sentinel shutting down"
        );
    }
}
