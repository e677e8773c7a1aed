use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::FrequencyCache;
use crate::client::ResultDataService;
use crate::error::Result;
use crate::types::{DataRef, DataView, Project};

/// Result-data service fronted by a [`FrequencyCache`] with adaptive expiry.
pub struct ResultCache {
    service: Arc<dyn ResultDataService>,
    cache: FrequencyCache<DataRef, DataView>,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Creates a cache of at most `max_size` views expiring after
    /// `hit_count * basic_duration`.
    pub fn new(
        service: Arc<dyn ResultDataService>,
        max_size: usize,
        basic_duration: Duration,
    ) -> Self {
        Self {
            service,
            cache: FrequencyCache::new(max_size).with_basic_duration(basic_duration),
        }
    }

    /// View of `data`, fetched on miss.
    pub async fn node_data(&self, data: &DataRef) -> Result<DataView> {
        let service = &self.service;
        self.cache
            .get_or_fetch(data.clone(), || service.node_data(data))
            .await
    }

    /// Drops views no node of `project` references any more, and views past
    /// their adaptive TTL. Returns the number removed.
    pub fn collect_garbage(&self, project: &Project) -> usize {
        self.retain_referenced(&project.data_refs())
    }

    /// Like [`collect_garbage`](Self::collect_garbage) with an explicit set
    /// of live handles.
    pub fn retain_referenced(&self, live: &BTreeSet<&DataRef>) -> usize {
        let removed = self.cache.sweep(|key| live.contains(key));
        if removed > 0 {
            tracing::debug!(removed, "result cache garbage collected");
        }
        removed
    }

    /// The underlying cache.
    pub fn cache(&self) -> &FrequencyCache<DataRef, DataView> {
        &self.cache
    }
}
