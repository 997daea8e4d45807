//! Generation-based invalidation.
//!
//! Every successful mutation draws one value from a global monotonic
//! counter and stamps it on the mutated type and on every type whose
//! ancestors include it (subclasses, and for modules the types that mix
//! them in, transitively). Caches remember the generation of the receiver
//! type they were filled under; a mismatch means stale.
//!
//! # Invalidation Protocol
//!
//! 1. Apply the edit (table insert, edge change) under the structure lock
//! 2. Draw the next global generation
//! 3. Walk reverse edges from the edited type
//! 4. Store the generation on each reached type with `Release`
//!
//! Readers load a type's generation with `Acquire` before reading tables
//! or edges, so a reader that observes the new value also observes the
//! edit. A reader that raced the edit caches under the old value and
//! misses on its next probe.
//!
//! # Performance Characteristics
//!
//! - `current_generation`: lock-free arena index, one atomic load
//! - `bump`: O(d), d = number of transitive dependents

use crate::error::RuntimeResult;
use crate::object::registry::{TypeRecord, TypeRegistry};
use crate::object::type_obj::TypeId;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

// =============================================================================
// Invalidation Tracker
// =============================================================================

/// Global generation counter plus sweep statistics.
#[derive(Debug)]
pub struct InvalidationTracker {
    global: AtomicU64,
    sweeps: AtomicU64,
    types_stamped: AtomicU64,
}

impl InvalidationTracker {
    pub const fn new() -> Self {
        Self {
            global: AtomicU64::new(1),
            sweeps: AtomicU64::new(0),
            types_stamped: AtomicU64::new(0),
        }
    }

    /// Latest generation handed out.
    #[inline]
    pub fn current(&self) -> u64 {
        self.global.load(Ordering::Acquire)
    }

    /// Draw a fresh generation.
    #[inline]
    pub(crate) fn advance(&self) -> u64 {
        self.global.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record_sweep(&self, stamped: usize) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.types_stamped.fetch_add(stamped as u64, Ordering::Relaxed);
    }

    /// Number of invalidation sweeps run so far.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Total per-type stamps across all sweeps.
    pub fn types_stamped(&self) -> u64 {
        self.types_stamped.load(Ordering::Relaxed)
    }
}

impl Default for InvalidationTracker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Registry Integration
// =============================================================================

impl TypeRegistry {
    /// Invalidate every cache rooted at `ty` or at a type inheriting from it.
    pub fn bump(&self, ty: TypeId) -> RuntimeResult<u64> {
        let _guard = self.lock_structure();
        self.bump_locked(ty)
    }

    pub(crate) fn bump_locked(&self, ty: TypeId) -> RuntimeResult<u64> {
        let generation = self.tracker().advance();
        self.publish_locked(ty, generation)?;
        Ok(generation)
    }

    /// Stamp an already drawn generation on `ty` and its dependents.
    pub(crate) fn publish_locked(&self, ty: TypeId, generation: u64) -> RuntimeResult<usize> {
        let affected = self.dependent_records(ty)?;
        for record in &affected {
            record.generation.fetch_max(generation, Ordering::Release);
        }
        self.tracker().record_sweep(affected.len());
        trace!(
            target: "garnet::invalidation",
            ty = %ty,
            generation,
            affected = affected.len(),
            "generation published"
        );
        Ok(affected.len())
    }

    /// `ty` plus every type whose ancestors contain `ty`.
    pub fn dependents(&self, ty: TypeId) -> RuntimeResult<Vec<TypeId>> {
        Ok(self
            .dependent_records(ty)?
            .iter()
            .map(|record| record.id())
            .collect())
    }

    fn dependent_records(&self, ty: TypeId) -> RuntimeResult<Vec<Arc<TypeRecord>>> {
        let mut seen = FxHashSet::default();
        let mut pending = vec![ty];
        let mut affected = Vec::new();
        seen.insert(ty);

        while let Some(id) = pending.pop() {
            let record = self.record(id)?;
            {
                let links = record.links.read();
                for &next in links.subclasses.iter().chain(links.includers.iter()) {
                    if seen.insert(next) {
                        pending.push(next);
                    }
                }
            }
            affected.push(record);
        }

        Ok(affected)
    }
}
