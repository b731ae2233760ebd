//! Smoothing configuration for the Holt-Winters forecaster
//!
//! Validated once at construction and never mutated afterwards, so a single
//! value can be copied into every engine and read from any task.

use serde::Serialize;
use thiserror::Error;

/// Rejected smoothing configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("smoothing factor {name} must be within [0, 1], got {value}")]
    SmoothingFactorOutOfRange { name: &'static str, value: f64 },

    #[error("confidence band scale teta must be positive, got {0}")]
    NonPositiveTeta(f64),

    #[error("season length must be a positive number of samples, got {0}")]
    NonPositiveSeasonLength(i64),

    #[error("sample interval must be a positive number of seconds, got {0}")]
    NonPositiveSampleInterval(i64),
}

/// Holt-Winters smoothing parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastParameters {
    alpha: f64,
    beta: f64,
    gamma: f64,
    teta: f64,
    season_length_samples: i64,
    sample_interval_seconds: i64,
}

impl ForecastParameters {
    /// Validate and build a parameter set
    ///
    /// # Arguments
    /// * `alpha` - Baseline smoothing, within `[0, 1]`
    /// * `beta` - Linear trend smoothing, within `[0, 1]`
    /// * `gamma` - Seasonal and deviation smoothing, within `[0, 1]`
    /// * `teta` - Confidence band scale, strictly positive
    /// * `season_length_samples` - Samples per seasonal cycle (`m`)
    /// * `sample_interval_seconds` - Seconds between two samples
    pub fn new(
        alpha: f64,
        beta: f64,
        gamma: f64,
        teta: f64,
        season_length_samples: i64,
        sample_interval_seconds: i64,
    ) -> Result<Self, ConfigurationError> {
        check_factor("alpha", alpha)?;
        check_factor("beta", beta)?;
        check_factor("gamma", gamma)?;

        // Written so that NaN is rejected too.
        if !(teta > 0.0) {
            return Err(ConfigurationError::NonPositiveTeta(teta));
        }
        if season_length_samples <= 0 {
            return Err(ConfigurationError::NonPositiveSeasonLength(
                season_length_samples,
            ));
        }
        if sample_interval_seconds <= 0 {
            return Err(ConfigurationError::NonPositiveSampleInterval(
                sample_interval_seconds,
            ));
        }

        Ok(Self {
            alpha,
            beta,
            gamma,
            teta,
            season_length_samples,
            sample_interval_seconds,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn teta(&self) -> f64 {
        self.teta
    }

    /// Number of samples in one seasonal cycle (`m`)
    pub fn season_length_samples(&self) -> i64 {
        self.season_length_samples
    }

    pub fn sample_interval_seconds(&self) -> i64 {
        self.sample_interval_seconds
    }
}

fn check_factor(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::SmoothingFactorOutOfRange { name, value })
    }
}
