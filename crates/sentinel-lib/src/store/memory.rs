//! In-memory report store
//!
//! Reports are indexed by tick, by id and by resource. The tick index owns
//! the report; the uniqueness of `(resource_id, season_index)` is decided
//! under that index's entry lock.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::{records_to_skip, ReportStore, StoreError};
use crate::models::{CyberReport, NewCyberReport, ReportId, ResourceId};

type TickKey = (ResourceId, i64);

/// DashMap-backed [`ReportStore`]
pub struct InMemoryReportStore {
    /// (resource_id, season_index) -> report
    ticks: DashMap<TickKey, CyberReport>,
    /// report_id -> tick key
    ids: DashMap<ReportId, TickKey>,
    /// resource_id -> report ids in creation order
    history: DashMap<ResourceId, Vec<ReportId>>,
    next_id: AtomicU64,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            ticks: DashMap::new(),
            ids: DashMap::new(),
            history: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Total number of persisted reports
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn find_by_season_index(
        &self,
        resource_id: ResourceId,
        season_index: i64,
    ) -> Result<Option<CyberReport>, StoreError> {
        Ok(self
            .ticks
            .get(&(resource_id, season_index))
            .map(|r| r.value().clone()))
    }

    async fn create(&self, report: NewCyberReport) -> Result<CyberReport, StoreError> {
        let key = (report.resource_id, report.season_index);

        match self.ticks.entry(key) {
            Entry::Occupied(_) => Err(StoreError::DuplicateTick {
                resource_id: key.0,
                season_index: key.1,
            }),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let stored = CyberReport::from_new(report, id, Utc::now());
                slot.insert(stored.clone());

                self.ids.insert(id, key);
                self.history.entry(key.0).or_default().push(id);

                debug!(
                    report_id = id,
                    resource_id = key.0,
                    season_index = key.1,
                    "Stored report"
                );
                Ok(stored)
            }
        }
    }

    async fn find_by_id(&self, id: ReportId) -> Result<CyberReport, StoreError> {
        let key = self
            .ids
            .get(&id)
            .map(|r| *r.value())
            .ok_or(StoreError::ReportNotFound(id))?;

        self.ticks
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or(StoreError::ReportNotFound(id))
    }

    async fn list_latest(
        &self,
        resource_id: ResourceId,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<CyberReport>, StoreError> {
        let report_ids = match self.history.get(&resource_id) {
            Some(ids) => ids.value().clone(),
            None => return Ok(Vec::new()),
        };

        let mut reports: Vec<CyberReport> = report_ids
            .iter()
            .filter_map(|id| self.ids.get(id).map(|r| *r.value()))
            .filter_map(|key| self.ticks.get(&key).map(|r| r.value().clone()))
            .collect();

        reports.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(reports
            .into_iter()
            .skip(records_to_skip(page, page_size))
            .take(page_size)
            .collect())
    }
}
