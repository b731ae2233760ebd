//! Sentinel configuration

use anyhow::{Context, Result};
use sentinel_lib::forecast::{ConfigurationError, ForecastParameters};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Sentinel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelConfig {
    /// Instance name used in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for intake, browsing, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Baseline smoothing. The last hour of observations carries most weight.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Linear trend smoothing across seasonal cycles
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// Seasonal smoothing
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Confidence band scale. Close to 2 favours catching attacks, close to 3
    /// favours fewer false positives.
    #[serde(default = "default_teta")]
    pub teta: f64,

    /// Seconds between two measurements of a resource
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: i64,

    /// Length of one seasonal cycle in seconds
    #[serde(default = "default_season_duration")]
    pub season_duration_secs: i64,

    /// Explicit samples per season; derived from the durations when unset
    #[serde(default)]
    pub season_length_samples: Option<i64>,

    /// Upper bound for each store call, in milliseconds
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    /// Ticks that may queue per resource
    #[serde(default = "default_worker_queue_depth")]
    pub worker_queue_depth: usize,

    /// Seconds a resource's worker waits for a tick before it is retired
    #[serde(default = "default_worker_idle_timeout")]
    pub worker_idle_timeout_secs: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "dos-sentinel".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_alpha() -> f64 {
    0.9
}

fn default_beta() -> f64 {
    0.5
}

fn default_gamma() -> f64 {
    0.5
}

fn default_teta() -> f64 {
    2.0
}

fn default_sample_interval() -> i64 {
    60
}

fn default_season_duration() -> i64 {
    24 * 60 * 60
}

fn default_worker_queue_depth() -> usize {
    sentinel_lib::orchestrator::DEFAULT_QUEUE_DEPTH
}

fn default_worker_idle_timeout() -> u64 {
    sentinel_lib::orchestrator::DEFAULT_IDLE_TIMEOUT.as_secs()
}

impl SentinelConfig {
    /// Load from `SENTINEL_CONFIG_FILE` (if set) overlaid by `SENTINEL_*` variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var("SENTINEL_CONFIG_FILE") {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("SENTINEL").try_parsing(true))
            .build()
            .context("failed to read sentinel configuration")?;

        config
            .try_deserialize()
            .context("invalid sentinel configuration")
    }

    /// Load from a single configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|config| config.try_deserialize())
            .with_context(|| format!("failed to load configuration from {}", path.display()))
    }

    /// Samples per seasonal cycle
    pub fn season_length(&self) -> i64 {
        self.season_length_samples.unwrap_or_else(|| {
            if self.sample_interval_secs > 0 {
                self.season_duration_secs / self.sample_interval_secs
            } else {
                0
            }
        })
    }

    /// Validated smoothing parameters
    pub fn forecast_parameters(&self) -> Result<ForecastParameters, ConfigurationError> {
        ForecastParameters::new(
            self.alpha,
            self.beta,
            self.gamma,
            self.teta,
            self.season_length(),
            self.sample_interval_secs,
        )
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }

    pub fn worker_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_idle_timeout_secs)
    }
}
