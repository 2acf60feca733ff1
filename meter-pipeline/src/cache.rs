use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Deserialize;

use crate::pipeline::{Outcome, PipelineError};
use crate::resolver::SeriesSet;
use crate::sources::raw::RawDataset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 64,
        }
    }
}

/// Content hash of a raw dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn of(dataset: &RawDataset) -> Result<Self, PipelineError> {
        let bytes = serde_json::to_vec(dataset)
            .map_err(|e| PipelineError::Source(format!("failed to encode dataset for hashing: {e}")))?;
        Ok(Self(*blake3::hash(&bytes).as_bytes()))
    }
}

/// Opt-in memoization of built series sets, keyed by dataset content.
///
/// Entries are immutable once inserted. The settings used to build them are
/// fixed for the lifetime of the cache.
pub struct SeriesCache {
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, Arc<Outcome<SeriesSet>>>>,
}

impl SeriesCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get_or_build<F>(&self, dataset: &RawDataset, build: F) -> Result<Arc<Outcome<SeriesSet>>, PipelineError>
    where
        F: FnOnce(&RawDataset) -> Result<Outcome<SeriesSet>, PipelineError>,
    {
        let key = CacheKey::of(dataset)?;
        if let Some(hit) = self.lock().get(&key).cloned() {
            metrics::counter!("series_cache_hits_total").increment(1);
            return Ok(hit);
        }

        // Built outside the lock; a concurrent miss on the same key builds twice
        // and the later insert wins with an identical value.
        let built = Arc::new(build(dataset)?);
        let mut entries = self.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            if let Some(evict) = entries.keys().next().copied() {
                entries.remove(&evict);
            }
        }
        entries.insert(key, Arc::clone(&built));
        Ok(built)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<Outcome<SeriesSet>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{build_series_set, PipelineSettings};
    use crate::sources::raw::{RawInterval, RawSdatDocument};
    use std::cell::Cell;

    fn dataset(total: f64) -> RawDataset {
        RawDataset {
            esl: Vec::new(),
            sdat: vec![RawSdatDocument {
                document_id: "ID735".to_string(),
                interval: RawInterval {
                    start: "2020-04-08T22:00:00Z".to_string(),
                    end: "2020-04-09T22:00:00Z".to_string(),
                },
                resolution: 15,
                data: Vec::new(),
                total_daily: Some(total),
            }],
        }
    }

    #[test]
    fn identical_datasets_share_an_entry() {
        let cache = SeriesCache::new(4);
        let settings = PipelineSettings::default();
        let builds = Cell::new(0);
        let build = |d: &RawDataset| {
            builds.set(builds.get() + 1);
            build_series_set(d, &settings)
        };

        let a = cache.get_or_build(&dataset(1.0), build).unwrap();
        let b = cache.get_or_build(&dataset(1.0), build).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.get(), 1);

        cache.get_or_build(&dataset(2.0), build).unwrap();
        assert_eq!(builds.get(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn capacity_bounds_entries() {
        let cache = SeriesCache::new(2);
        let settings = PipelineSettings::default();
        for total in [1.0, 2.0, 3.0] {
            cache
                .get_or_build(&dataset(total), |d| build_series_set(d, &settings))
                .unwrap();
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn key_depends_on_content() {
        assert_eq!(CacheKey::of(&dataset(1.0)).unwrap(), CacheKey::of(&dataset(1.0)).unwrap());
        assert_ne!(CacheKey::of(&dataset(1.0)).unwrap(), CacheKey::of(&dataset(1.5)).unwrap());
    }
}
