//! Seasonal traffic forecasting
//!
//! This module provides:
//! - Validated smoothing parameters
//! - The pure Holt-Winters step with its confidence band
//! - Season index arithmetic for locating lag ticks

mod engine;
mod params;
mod season;

pub use engine::{Forecast, HoltWintersEngine, LagBundle};
pub use params::{ConfigurationError, ForecastParameters};
pub use season::{LagIndices, SeasonClock};
