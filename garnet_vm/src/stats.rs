//! Dispatch statistics.
//!
//! Counters are updated with relaxed atomics; a snapshot is only
//! internally consistent when no dispatch is running concurrently.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one dispatcher.
#[derive(Debug)]
pub struct DispatchStats {
    // =========================================================================
    // Call Sites
    // =========================================================================
    /// Lookups answered by a call site's own cache.
    pub site_hits: AtomicU64,
    /// Lookups a call site could not answer (cold, stale or new receiver).
    pub site_misses: AtomicU64,
    /// Lookups from sites that stopped caching.
    pub megamorphic_lookups: AtomicU64,

    // =========================================================================
    // State Transitions
    // =========================================================================
    /// Stale entries re-resolved in place.
    pub refreshes: AtomicU64,
    pub to_polymorphic: AtomicU64,
    pub to_megamorphic: AtomicU64,

    // =========================================================================
    // Resolution
    // =========================================================================
    /// Lookups answered by the shared method cache.
    pub method_cache_hits: AtomicU64,
    pub method_cache_misses: AtomicU64,
    /// MRO walks run by the resolver on behalf of this dispatcher.
    pub full_resolutions: AtomicU64,
}

impl DispatchStats {
    pub const fn new() -> Self {
        Self {
            site_hits: AtomicU64::new(0),
            site_misses: AtomicU64::new(0),
            megamorphic_lookups: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            to_polymorphic: AtomicU64::new(0),
            to_megamorphic: AtomicU64::new(0),
            method_cache_hits: AtomicU64::new(0),
            method_cache_misses: AtomicU64::new(0),
            full_resolutions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            site_hits: self.site_hits.load(Ordering::Relaxed),
            site_misses: self.site_misses.load(Ordering::Relaxed),
            megamorphic_lookups: self.megamorphic_lookups.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            to_polymorphic: self.to_polymorphic.load(Ordering::Relaxed),
            to_megamorphic: self.to_megamorphic.load(Ordering::Relaxed),
            method_cache_hits: self.method_cache_hits.load(Ordering::Relaxed),
            method_cache_misses: self.method_cache_misses.load(Ordering::Relaxed),
            full_resolutions: self.full_resolutions.load(Ordering::Relaxed),
        }
    }

    /// Reset all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.site_hits,
            &self.site_misses,
            &self.megamorphic_lookups,
            &self.refreshes,
            &self.to_polymorphic,
            &self.to_megamorphic,
            &self.method_cache_hits,
            &self.method_cache_misses,
            &self.full_resolutions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of `DispatchStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub site_hits: u64,
    pub site_misses: u64,
    pub megamorphic_lookups: u64,
    pub refreshes: u64,
    pub to_polymorphic: u64,
    pub to_megamorphic: u64,
    pub method_cache_hits: u64,
    pub method_cache_misses: u64,
    pub full_resolutions: u64,
}

impl StatsSnapshot {
    /// Total lookups seen by call sites.
    pub fn lookups(&self) -> u64 {
        self.site_hits + self.site_misses + self.megamorphic_lookups
    }

    /// Share of lookups answered by call sites, as a percentage.
    ///
    /// Returns 0.0 if no lookups have been performed.
    pub fn site_hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            (self.site_hits as f64 / total as f64) * 100.0
        }
    }
}
