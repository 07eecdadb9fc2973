//! Bin balance caching using Moka.
//!
//! Holds the latest balance of each bin so that valuation reads do not walk
//! the timeline. Every append or valuation rewrite invalidates the affected
//! bin.

use std::time::Duration;

use moka::sync::Cache;

use super::entry::BinKey;
use crate::valuation::BinSnapshot;

/// Default cache capacity (number of bins).
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Default time-to-idle for cached balances (10 minutes).
const DEFAULT_TTI_SECS: u64 = 600;

/// Cache of latest bin balances.
pub struct BinCache {
    cache: Cache<BinKey, BinSnapshot>,
}

impl BinCache {
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_TTI_SECS)
    }

    /// Creates a cache with a custom capacity and time-to-idle.
    #[must_use]
    pub fn with_config(max_capacity: u64, tti_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(Duration::from_secs(tti_secs))
            .build();

        Self { cache }
    }

    /// Returns the cached balance, computing and storing it on a miss.
    pub fn get_or_compute(&self, key: &BinKey, compute: impl FnOnce() -> BinSnapshot) -> BinSnapshot {
        self.cache.get_with(key.clone(), compute)
    }

    /// Returns the cached balance if present.
    #[must_use]
    pub fn get(&self, key: &BinKey) -> Option<BinSnapshot> {
        self.cache.get(key)
    }

    /// Drops the cached balance of one bin.
    pub fn invalidate(&self, key: &BinKey) {
        self.cache.invalidate(key);
    }

    /// Drops every cached balance.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Returns the number of cached bins.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance so counts are current.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for BinCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A staged copy of the store must never share balances with the committed
/// one, so cloning starts from an empty cache.
impl Clone for BinCache {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BinCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}
