//! One forecasting tick: resolve lags, forecast, persist
//!
//! The orchestrator holds no per-resource state of its own. Everything a tick
//! depends on is read back from the store, so ticks for one resource must be
//! serialized by the caller (see [`super::TickDispatcher`]).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::TickError;
use crate::forecast::{ForecastParameters, HoltWintersEngine, LagBundle, SeasonClock};
use crate::models::{CyberReport, NewCyberReport, ResourceId};
use crate::observability::{SentinelMetrics, StructuredLogger};
use crate::store::{ReportStore, StoreError};

/// Coordinates a single forecasting tick against the report store
pub struct ForecastStepOrchestrator {
    engine: HoltWintersEngine,
    clock: SeasonClock,
    store: Arc<dyn ReportStore>,
    /// Upper bound for each individual store call
    store_timeout: Option<Duration>,
    metrics: SentinelMetrics,
    logger: StructuredLogger,
}

impl ForecastStepOrchestrator {
    pub fn new(params: ForecastParameters, store: Arc<dyn ReportStore>) -> Self {
        Self {
            engine: HoltWintersEngine::new(params),
            clock: SeasonClock::new(&params),
            store,
            store_timeout: None,
            metrics: SentinelMetrics::new(),
            logger: StructuredLogger::new("dos-sentinel"),
        }
    }

    /// Bound every store call by `timeout`
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn params(&self) -> &ForecastParameters {
        self.engine.params()
    }

    pub fn season_clock(&self) -> &SeasonClock {
        &self.clock
    }

    /// Compute and persist the report for `(resource_id, season_index)`
    ///
    /// A duplicate tick comes back as [`StoreError::DuplicateTick`] and must
    /// not be retried. Other store failures leave nothing persisted, and a
    /// retry reproduces the same report.
    pub async fn process_tick(
        &self,
        resource_id: ResourceId,
        season_index: i64,
        actual_value: f64,
    ) -> Result<CyberReport, TickError> {
        let start = Instant::now();

        let lags = self
            .resolve_lags(resource_id, season_index)
            .await
            .map_err(|e| self.store_failure(resource_id, season_index, e))?;

        let forecast = self.engine.compute_tick(actual_value, &lags);

        let report = self
            .bounded(self.store.create(NewCyberReport {
                resource_id,
                season_index,
                actual_value,
                forecast,
            }))
            .await
            .map_err(|e| self.store_failure(resource_id, season_index, e))?;

        self.metrics
            .observe_tick_latency(start.elapsed().as_secs_f64());
        self.metrics.record_tick(report.is_aberrant());
        self.logger.log_tick(&report, lags.present_count());
        if report.is_aberrant() {
            self.logger.log_aberrant_behavior(&report);
        }

        Ok(report)
    }

    /// Fetch the `t - m`, `t + 1 - m` and `t - 1` reports concurrently
    async fn resolve_lags(
        &self,
        resource_id: ResourceId,
        season_index: i64,
    ) -> Result<LagBundle, StoreError> {
        let indices = self.clock.lag_indices(season_index);

        let (t_minus_m, t_plus_one_minus_m, t_minus_one) = tokio::try_join!(
            self.lag_report(resource_id, indices.t_minus_m),
            self.lag_report(resource_id, indices.t_plus_one_minus_m),
            self.lag_report(resource_id, indices.t_minus_one),
        )?;

        Ok(LagBundle::new(
            t_minus_m.map(|r| r.forecast),
            t_plus_one_minus_m.map(|r| r.forecast),
            t_minus_one.map(|r| r.forecast),
        ))
    }

    /// Lag report at `season_index`; an index below the `i64` range is absent
    async fn lag_report(
        &self,
        resource_id: ResourceId,
        season_index: Option<i64>,
    ) -> Result<Option<CyberReport>, StoreError> {
        match season_index {
            Some(index) => {
                self.bounded(self.store.find_by_season_index(resource_id, index))
                    .await
            }
            None => Ok(None),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => call.await,
        }
    }

    fn store_failure(
        &self,
        resource_id: ResourceId,
        season_index: i64,
        error: StoreError,
    ) -> TickError {
        match &error {
            StoreError::DuplicateTick { .. } => {
                self.metrics.inc_duplicate_ticks();
                self.logger.log_duplicate_tick(resource_id, season_index);
            }
            other => {
                self.metrics.inc_store_errors();
                warn!(
                    resource_id = resource_id,
                    season_index = season_index,
                    error = %other,
                    "Store call failed during tick"
                );
            }
        }
        TickError::Store(error)
    }
}
