//! Season index arithmetic
//!
//! Season indices count sample intervals since the Unix epoch. They grow
//! monotonically and are never wrapped, so the tick one cycle back is always
//! `index - m`. Any `i64` is a valid index; a lag that would fall below
//! `i64::MIN` does not exist.

use chrono::{DateTime, Utc};

use super::ForecastParameters;

/// Season indices of the three lag ticks for a given tick
///
/// `None` marks a lag whose index is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LagIndices {
    pub t_minus_m: Option<i64>,
    pub t_plus_one_minus_m: Option<i64>,
    pub t_minus_one: Option<i64>,
}

/// Maps wall-clock time onto season indices
#[derive(Debug, Clone, Copy)]
pub struct SeasonClock {
    sample_interval_secs: i64,
    season_length: i64,
}

impl SeasonClock {
    pub fn new(params: &ForecastParameters) -> Self {
        Self {
            sample_interval_secs: params.sample_interval_seconds(),
            season_length: params.season_length_samples(),
        }
    }

    /// Season index of the sample interval containing `at`
    pub fn index_at(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.sample_interval_secs)
    }

    /// Season index of the current sample interval
    pub fn current_index(&self) -> i64 {
        self.index_at(Utc::now())
    }

    /// Position of `season_index` within its cycle, in `0..m`
    pub fn phase(&self, season_index: i64) -> i64 {
        season_index.rem_euclid(self.season_length)
    }

    /// Indices of the ticks `t - m`, `t + 1 - m` and `t - 1`
    pub fn lag_indices(&self, season_index: i64) -> LagIndices {
        LagIndices {
            t_minus_m: season_index.checked_sub(self.season_length),
            t_plus_one_minus_m: season_index.checked_sub(self.season_length - 1),
            t_minus_one: season_index.checked_sub(1),
        }
    }
}
