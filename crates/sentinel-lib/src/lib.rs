//! Sentinel library for traffic anomaly detection
//!
//! This crate provides the core functionality for:
//! - Holt-Winters seasonal forecasting with confidence bands
//! - Per-tick orchestration against a report store
//! - Per-resource serialization of ticks
//! - Health checks and observability

pub mod forecast;
pub mod health;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod store;

pub use forecast::{ConfigurationError, Forecast, ForecastParameters, HoltWintersEngine, LagBundle};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SentinelMetrics, StructuredLogger};
pub use orchestrator::{ForecastStepOrchestrator, TickDispatcher, TickError};
pub use store::{ReportStore, ResourceRegistry, StoreError};
