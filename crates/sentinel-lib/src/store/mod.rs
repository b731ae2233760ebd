//! Report persistence and resource registration
//!
//! The forecasting core only talks to storage through these traits. The
//! in-memory implementations back the daemon and the test suites.

mod memory;
mod registry;

pub use memory::InMemoryReportStore;
pub use registry::InMemoryResourceRegistry;

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CyberReport, MonitoredResource, NewCyberReport, ReportId, ResourceId};

/// Failures surfaced by a report store or resource registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A report for this tick already exists. Not retryable.
    #[error("report for resource {resource_id} at season index {season_index} already exists")]
    DuplicateTick {
        resource_id: ResourceId,
        season_index: i64,
    },

    #[error("report {0} not found")]
    ReportNotFound(ReportId),

    #[error("resource {0} not found")]
    ResourceNotFound(ResourceId),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    /// Whether the same call may succeed if repeated later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

/// Append-only history of forecasting ticks
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Report of `resource_id` at `season_index`, if one was persisted
    async fn find_by_season_index(
        &self,
        resource_id: ResourceId,
        season_index: i64,
    ) -> Result<Option<CyberReport>, StoreError>;

    /// Persist a computed tick, assigning its id and creation time
    ///
    /// Fails with [`StoreError::DuplicateTick`] if the
    /// `(resource_id, season_index)` pair is already taken.
    async fn create(&self, report: NewCyberReport) -> Result<CyberReport, StoreError>;

    /// Fetch a single report; fails with [`StoreError::ReportNotFound`]
    async fn find_by_id(&self, id: ReportId) -> Result<CyberReport, StoreError>;

    /// Newest-first page of a resource's reports. Pages start at 1.
    async fn list_latest(
        &self,
        resource_id: ResourceId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<CyberReport>, StoreError>;
}

/// Registry of monitored endpoints
#[async_trait]
pub trait ResourceRegistry: Send + Sync {
    /// Id of the resource at `address`, registering it on first sight
    async fn lookup_or_create(
        &self,
        address: IpAddr,
        name: Option<&str>,
    ) -> Result<ResourceId, StoreError>;

    async fn get(&self, id: ResourceId) -> Result<MonitoredResource, StoreError>;

    async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError>;

    /// Number of registered resources
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Number of records before `page` when pages hold `page_size` records
pub(crate) fn records_to_skip(page: usize, page_size: usize) -> usize {
    page.max(1).saturating_sub(1).saturating_mul(page_size)
}
