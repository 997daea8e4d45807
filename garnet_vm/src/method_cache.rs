//! Shared method cache for lookups call sites cannot answer.
//!
//! Resolution walks the receiver type's MRO, which is O(n) in hierarchy
//! depth. This cache memoizes results per (receiver type, name, start
//! position) across all call sites, so megamorphic sites and cold sites
//! for already-seen types skip the walk.
//!
//! # Cache Hierarchy
//!
//! 1. **Call site** - per location, mono/poly entries
//! 2. **Method cache (this)** - shared, any number of types
//! 3. **Resolver** - full MRO walk, populates both
//!
//! # Invalidation
//!
//! Entries carry the receiver type's generation at fill time. A lookup
//! with a different current generation is a miss and the stale entry is
//! overwritten by the next insert, so mutations never touch this cache.
//! Entries for types that are never dispatched on again would linger, so
//! the dispatcher sweeps stale entries out once the cache passes its
//! configured limit.

use dashmap::DashMap;
use garnet_runtime::{Lookup, Symbol, TypeId};
use rustc_hash::FxBuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Key and Entry
// =============================================================================

/// Receiver type, method name, and for `super` lookups the defining type
/// the search starts after.
pub type MethodKey = (TypeId, Symbol, Option<TypeId>);

/// Cached resolution result.
#[derive(Debug, Clone)]
pub struct CachedMethod {
    /// Receiver type generation the result was computed under.
    pub generation: u64,
    pub lookup: Lookup,
}

// =============================================================================
// Method Cache
// =============================================================================

/// Global method resolution cache.
///
/// Sharded map; readers on different shards never contend.
#[derive(Debug)]
pub struct MethodCache {
    cache: DashMap<MethodKey, CachedMethod, FxBuildHasher>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl MethodCache {
    /// Create a new empty method cache.
    pub fn new() -> Self {
        Self {
            cache: DashMap::with_hasher(FxBuildHasher),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cached result for `key`, if it was computed under `generation`.
    #[inline]
    pub fn get(&self, key: MethodKey, generation: u64) -> Option<Lookup> {
        let result = self
            .cache
            .get(&key)
            .filter(|cached| cached.generation == generation)
            .map(|cached| cached.lookup.clone());

        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Store a result. An entry with a newer generation is kept instead.
    pub fn insert(&self, key: MethodKey, generation: u64, lookup: Lookup) {
        self.cache
            .entry(key)
            .and_modify(|cached| {
                if generation >= cached.generation {
                    *cached = CachedMethod {
                        generation,
                        lookup: lookup.clone(),
                    };
                }
            })
            .or_insert_with(|| CachedMethod { generation, lookup });
    }

    /// Drop entries `is_current` rejects, given the receiver type and the
    /// generation the entry was filled under. Returns the number removed.
    ///
    /// Generation checks already make stale entries unreachable; this only
    /// reclaims memory.
    pub fn purge_stale(&self, is_current: impl Fn(TypeId, u64) -> bool) -> usize {
        let before = self.cache.len();
        self.cache
            .retain(|(receiver, _, _), cached| is_current(*receiver, cached.generation));
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        before.saturating_sub(self.cache.len())
    }

    /// Invalidate the entire cache.
    pub fn clear(&self) {
        self.cache.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Tuple of (hits, misses, invalidations).
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.invalidations.load(Ordering::Relaxed),
        )
    }

    /// Calculate hit rate as a percentage.
    ///
    /// Returns 0.0 if no lookups have been performed.
    pub fn hit_rate(&self) -> f64 {
        let (hits, misses, _) = self.stats();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for MethodCache {
    fn default() -> Self {
        Self::new()
    }
}
