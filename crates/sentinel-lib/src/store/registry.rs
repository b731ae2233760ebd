//! In-memory registry of monitored resources

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use super::{ResourceRegistry, StoreError};
use crate::models::{MonitoredResource, ResourceId};

/// DashMap-backed [`ResourceRegistry`] keyed by address
pub struct InMemoryResourceRegistry {
    /// address -> resource
    by_address: DashMap<IpAddr, MonitoredResource>,
    /// resource_id -> address
    addresses: DashMap<ResourceId, IpAddr>,
    next_id: AtomicU64,
}

impl InMemoryResourceRegistry {
    pub fn new() -> Self {
        Self {
            by_address: DashMap::new(),
            addresses: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

impl Default for InMemoryResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceRegistry for InMemoryResourceRegistry {
    async fn lookup_or_create(
        &self,
        address: IpAddr,
        name: Option<&str>,
    ) -> Result<ResourceId, StoreError> {
        let entry = self.by_address.entry(address).or_insert_with(|| {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let resource = MonitoredResource {
                id,
                name: name.map_or_else(|| address.to_string(), str::to_string),
                address,
                created_at: Utc::now(),
            };
            info!(resource_id = id, address = %address, name = %resource.name, "Registered resource");
            resource
        });
        let id = entry.id;
        drop(entry);

        self.addresses.entry(id).or_insert(address);
        Ok(id)
    }

    async fn get(&self, id: ResourceId) -> Result<MonitoredResource, StoreError> {
        let address = self
            .addresses
            .get(&id)
            .map(|r| *r.value())
            .ok_or(StoreError::ResourceNotFound(id))?;

        self.by_address
            .get(&address)
            .map(|r| r.value().clone())
            .ok_or(StoreError::ResourceNotFound(id))
    }

    async fn list(&self) -> Result<Vec<MonitoredResource>, StoreError> {
        let mut resources: Vec<MonitoredResource> =
            self.by_address.iter().map(|r| r.value().clone()).collect();
        resources.sort_by_key(|r| r.id);
        Ok(resources)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.by_address.len())
    }
}
