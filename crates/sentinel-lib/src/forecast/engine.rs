//! Holt-Winters forecasting step with a Brutlag confidence band
//!
//! One call computes the derived fields of a single tick from the new
//! measurement and up to three earlier ticks:
//!
//! ```text
//! baseline   = α (x - s[t-m]) + (1 - α)(b[t-1] + l[t-1])
//! trend      = β (baseline - b[t-1]) + (1 - β) l[t-1]
//! seasonal   = γ (x - baseline) + (1 - γ) s[t-m]
//! estimate   = baseline + trend + s[t+1-m]
//! deviation  = γ |x - ŷ[t-1]| + (1 - γ) d[t-m]
//! band upper = ŷ[t-1] + θ d[t-m]
//! aberrant   = x > band[t-1]
//! ```
//!
//! A missing earlier tick never fails the step. Its terms fall back to
//! defaults so a series bootstraps from its very first sample.

use serde::{Deserialize, Serialize};

use super::ForecastParameters;

/// Derived state of one tick
///
/// These are exactly the computed fields of a report, and also what a later
/// tick reads back from its lag reports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub baseline: f64,
    pub linear_trend: f64,
    pub seasonal_trend: f64,
    pub estimated_value: f64,
    pub weighted_avg_abs_deviation: f64,
    pub confidence_band_upper_value: f64,
    pub aberrant_behavior: bool,
}

/// The earlier ticks a forecasting step depends on
///
/// Each slot is independently present or absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LagBundle {
    /// Tick `t - m`: same phase in the previous cycle
    pub t_minus_m: Option<Forecast>,
    /// Tick `t + 1 - m`: next phase in the previous cycle
    pub t_plus_one_minus_m: Option<Forecast>,
    /// Tick `t - 1`: the immediately preceding tick
    pub t_minus_one: Option<Forecast>,
}

impl LagBundle {
    /// Bundle with no history at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        t_minus_m: Option<Forecast>,
        t_plus_one_minus_m: Option<Forecast>,
        t_minus_one: Option<Forecast>,
    ) -> Self {
        Self {
            t_minus_m,
            t_plus_one_minus_m,
            t_minus_one,
        }
    }

    /// Number of lag slots that hold a tick
    pub fn present_count(&self) -> usize {
        [self.t_minus_m, self.t_plus_one_minus_m, self.t_minus_one]
            .iter()
            .filter(|lag| lag.is_some())
            .count()
    }
}

/// Pure Holt-Winters step function
///
/// Stateless apart from its parameters; safe to share or copy across tasks.
#[derive(Debug, Clone, Copy)]
pub struct HoltWintersEngine {
    params: ForecastParameters,
}

impl HoltWintersEngine {
    pub fn new(params: ForecastParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ForecastParameters {
        &self.params
    }

    /// Compute the derived fields for the tick observing `actual_value`
    ///
    /// Non-finite measurements are not rejected: they propagate through the
    /// arithmetic, and since every comparison with NaN is false a NaN tick is
    /// never flagged as aberrant.
    pub fn compute_tick(&self, actual_value: f64, lags: &LagBundle) -> Forecast {
        let alpha = self.params.alpha();
        let beta = self.params.beta();
        let gamma = self.params.gamma();
        let teta = self.params.teta();

        let seasonal_prev = lags.t_minus_m.map_or(0.0, |lag| lag.seasonal_trend);
        let deviation_prev = lags
            .t_minus_m
            .map_or(0.0, |lag| lag.weighted_avg_abs_deviation);
        let seasonal_next_phase = lags
            .t_plus_one_minus_m
            .map_or(0.0, |lag| lag.seasonal_trend);

        let baseline_prev = lags.t_minus_one.map_or(actual_value, |lag| lag.baseline);
        let trend_prev = lags.t_minus_one.map_or(0.0, |lag| lag.linear_trend);
        let estimate_prev = lags
            .t_minus_one
            .map_or(actual_value, |lag| lag.estimated_value);
        let band_prev = lags
            .t_minus_one
            .map_or(estimate_prev, |lag| lag.confidence_band_upper_value);

        let baseline = alpha * (actual_value - seasonal_prev)
            + (1.0 - alpha) * (baseline_prev + trend_prev);
        let linear_trend = beta * (baseline - baseline_prev) + (1.0 - beta) * trend_prev;
        let seasonal_trend = gamma * (actual_value - baseline) + (1.0 - gamma) * seasonal_prev;
        let estimated_value = baseline + linear_trend + seasonal_next_phase;
        let weighted_avg_abs_deviation =
            gamma * (actual_value - estimate_prev).abs() + (1.0 - gamma) * deviation_prev;

        // The band is built from the previous estimate and the deviation one
        // cycle back; with no previous tick there is no band yet.
        let confidence_band_upper_value = if lags.t_minus_one.is_some() {
            estimate_prev + teta * deviation_prev
        } else {
            estimated_value
        };

        Forecast {
            baseline,
            linear_trend,
            seasonal_trend,
            estimated_value,
            weighted_avg_abs_deviation,
            confidence_band_upper_value,
            aberrant_behavior: actual_value > band_prev,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn engine() -> HoltWintersEngine {
        HoltWintersEngine::new(ForecastParameters::new(0.9, 0.5, 0.5, 2.0, 24, 60).unwrap())
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_bootstrap_from_empty_history() {
        for value in [0.0, 1.0, 100.0, -42.5, 1e9] {
            let forecast = engine().compute_tick(value, &LagBundle::empty());

            assert_close(forecast.baseline, value);
            assert_close(forecast.linear_trend, 0.0);
            assert_close(forecast.seasonal_trend, 0.0);
            assert_close(forecast.estimated_value, value);
            assert_close(forecast.weighted_avg_abs_deviation, 0.0);
            assert_close(forecast.confidence_band_upper_value, value);
            assert!(!forecast.aberrant_behavior);
        }
    }

    #[test]
    fn test_second_tick_against_first() {
        let engine = engine();
        let first = engine.compute_tick(100.0, &LagBundle::empty());
        let second = engine.compute_tick(105.0, &LagBundle::new(None, None, Some(first)));

        assert_close(second.baseline, 104.5);
        assert_close(second.linear_trend, 2.25);
        assert_close(second.seasonal_trend, 0.25);
        assert_close(second.estimated_value, 106.75);
        assert_close(second.weighted_avg_abs_deviation, 2.5);
        assert_close(second.confidence_band_upper_value, 100.0);
        assert!(second.aberrant_behavior);
    }

    #[test]
    fn test_value_on_band_is_not_aberrant() {
        let engine = engine();
        let first = engine.compute_tick(100.0, &LagBundle::empty());
        let second = engine.compute_tick(100.0, &LagBundle::new(None, None, Some(first)));

        assert!(!second.aberrant_behavior);
        assert_close(second.weighted_avg_abs_deviation, 0.0);
    }

    #[test]
    fn test_seasonal_history_without_previous_tick() {
        let season_ago = Forecast {
            baseline: 50.0,
            linear_trend: 1.0,
            seasonal_trend: 10.0,
            estimated_value: 61.0,
            weighted_avg_abs_deviation: 4.0,
            confidence_band_upper_value: 70.0,
            aberrant_behavior: false,
        };
        let forecast = engine().compute_tick(80.0, &LagBundle::new(Some(season_ago), None, None));

        // baseline = 0.9 * (80 - 10) + 0.1 * (80 + 0)
        assert_close(forecast.baseline, 71.0);
        // trend = 0.5 * (71 - 80)
        assert_close(forecast.linear_trend, -4.5);
        // seasonal = 0.5 * (80 - 71) + 0.5 * 10
        assert_close(forecast.seasonal_trend, 9.5);
        assert_close(forecast.estimated_value, 66.5);
        // deviation = 0.5 * |80 - 80| + 0.5 * 4
        assert_close(forecast.weighted_avg_abs_deviation, 2.0);
        assert_close(forecast.confidence_band_upper_value, 66.5);
        assert!(!forecast.aberrant_behavior);
    }

    #[test]
    fn test_band_uses_deviation_from_previous_cycle() {
        let previous = Forecast {
            baseline: 100.0,
            linear_trend: 0.0,
            seasonal_trend: 0.0,
            estimated_value: 100.0,
            weighted_avg_abs_deviation: 50.0,
            confidence_band_upper_value: 120.0,
            aberrant_behavior: false,
        };
        let season_ago = Forecast {
            weighted_avg_abs_deviation: 3.0,
            ..previous
        };
        let forecast = engine().compute_tick(
            110.0,
            &LagBundle::new(Some(season_ago), None, Some(previous)),
        );

        assert_close(forecast.confidence_band_upper_value, 106.0);
        assert!(!forecast.aberrant_behavior);
    }

    #[test]
    fn test_next_phase_seasonal_feeds_estimate() {
        let next_phase = Forecast {
            baseline: 0.0,
            linear_trend: 0.0,
            seasonal_trend: 7.0,
            estimated_value: 0.0,
            weighted_avg_abs_deviation: 0.0,
            confidence_band_upper_value: 0.0,
            aberrant_behavior: false,
        };
        let forecast = engine().compute_tick(20.0, &LagBundle::new(None, Some(next_phase), None));

        assert_close(forecast.baseline, 20.0);
        assert_close(forecast.seasonal_trend, 0.0);
        assert_close(forecast.estimated_value, 27.0);
    }

    #[test]
    fn test_deterministic() {
        let engine = engine();
        let first = engine.compute_tick(100.0, &LagBundle::empty());
        let lags = LagBundle::new(Some(first), Some(first), Some(first));

        let a = engine.compute_tick(123.4, &lags);
        let b = engine.compute_tick(123.4, &lags);
        assert_eq!(a, b);
    }

    #[test]
    fn test_nan_measurement_is_never_aberrant() {
        let engine = engine();
        let first = engine.compute_tick(100.0, &LagBundle::empty());
        let forecast = engine.compute_tick(f64::NAN, &LagBundle::new(None, None, Some(first)));

        assert!(forecast.baseline.is_nan());
        assert!(!forecast.aberrant_behavior);

        let bootstrap = engine.compute_tick(f64::NAN, &LagBundle::empty());
        assert!(!bootstrap.aberrant_behavior);
    }

    #[test]
    fn test_infinite_measurement_is_aberrant() {
        let engine = engine();
        let first = engine.compute_tick(100.0, &LagBundle::empty());
        let forecast =
            engine.compute_tick(f64::INFINITY, &LagBundle::new(None, None, Some(first)));

        assert!(forecast.aberrant_behavior);
    }

    #[test]
    fn test_present_count() {
        let first = engine().compute_tick(1.0, &LagBundle::empty());
        assert_eq!(LagBundle::empty().present_count(), 0);
        assert_eq!(LagBundle::new(Some(first), None, Some(first)).present_count(), 2);
    }
}
