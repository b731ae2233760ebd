//! Core data models for the sentinel

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecast::Forecast;

/// Identifier of a monitored resource, assigned by the registry
pub type ResourceId = u64;

/// Identifier of a persisted report, assigned by the store
pub type ReportId = u64;

/// Network endpoint under observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredResource {
    pub id: ResourceId,
    pub name: String,
    pub address: IpAddr,
    pub created_at: DateTime<Utc>,
}

/// A computed tick that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCyberReport {
    pub resource_id: ResourceId,
    pub season_index: i64,
    pub actual_value: f64,
    #[serde(flatten)]
    pub forecast: Forecast,
}

/// One persisted forecasting tick for one resource
///
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyberReport {
    pub id: ReportId,
    pub resource_id: ResourceId,
    pub season_index: i64,
    pub actual_value: f64,
    #[serde(flatten)]
    pub forecast: Forecast,
    pub created_at: DateTime<Utc>,
}

impl CyberReport {
    /// Attach store-assigned identity to a computed tick
    pub fn from_new(report: NewCyberReport, id: ReportId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            resource_id: report.resource_id,
            season_index: report.season_index,
            actual_value: report.actual_value,
            forecast: report.forecast,
            created_at,
        }
    }

    /// The anomaly signal consumed by alerting
    pub fn is_aberrant(&self) -> bool {
        self.forecast.aberrant_behavior
    }
}
