//! Per-call-site method caches.
//!
//! Each call location owns one `CallSite`. The site remembers which entry
//! a receiver type resolved to, together with the receiver type's
//! generation at the time, and degrades as it sees more receiver types:
//!
//! ```text
//!                    ┌───────────────┐
//!                    │ Uninitialized │
//!                    └───────┬───────┘
//!                            │ first resolution
//!                    ╔═══════▼═══════╗
//!                    ║  Monomorphic  ║◄─┐ same type, stale generation:
//!                    ╚═══════╤═══════╝──┘ overwrite in place
//!                            │ different receiver type
//!                    ╔═══════▼═══════╗
//!                    ║  Polymorphic  ║  (up to capacity types)
//!                    ╚═══════╤═══════╝
//!                            │ one type too many
//!                    ┌───────▼───────┐
//!                    │  Megamorphic  │  terminal
//!                    └───────────────┘
//! ```
//!
//! A cached entry is valid only while its generation equals the receiver
//! type's current generation; callers load that generation before
//! probing and before resolving, never after.

use garnet_runtime::{Lookup, LookupError, Symbol, TypeId};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Cache Entries
// =============================================================================

/// One cached resolution.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub receiver: TypeId,
    /// Defining type a `super` lookup started after; `None` for plain calls.
    pub defined_in: Option<TypeId>,
    /// Receiver type generation loaded before resolving.
    pub generation: u64,
    /// Resolution result, including negative results.
    pub outcome: Lookup,
}

impl CacheEntry {
    #[inline(always)]
    fn same_key(&self, receiver: TypeId, defined_in: Option<TypeId>) -> bool {
        self.receiver == receiver && self.defined_in == defined_in
    }

    /// Worth storing: every outcome except registry failures.
    #[inline]
    pub fn is_cacheable(outcome: &Lookup) -> bool {
        !matches!(outcome, Err(LookupError::Runtime(_)))
    }
}

/// Polymorphic entry list. Bimorphic sites stay inline.
type PolyEntries = SmallVec<[CacheEntry; 2]>;

#[derive(Debug, Default)]
enum SiteState {
    #[default]
    Uninitialized,
    Monomorphic(CacheEntry),
    Polymorphic(PolyEntries),
    Megamorphic,
}

impl SiteState {
    fn kind(&self) -> SiteStateKind {
        match self {
            SiteState::Uninitialized => SiteStateKind::Uninitialized,
            SiteState::Monomorphic(_) => SiteStateKind::Monomorphic,
            SiteState::Polymorphic(_) => SiteStateKind::Polymorphic,
            SiteState::Megamorphic => SiteStateKind::Megamorphic,
        }
    }
}

/// Observable call-site state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStateKind {
    Uninitialized,
    Monomorphic,
    Polymorphic,
    Megamorphic,
}

impl fmt::Display for SiteStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SiteStateKind::Uninitialized => "uninitialized",
            SiteStateKind::Monomorphic => "monomorphic",
            SiteStateKind::Polymorphic => "polymorphic",
            SiteStateKind::Megamorphic => "megamorphic",
        })
    }
}

/// Result of asking a site for a cached resolution.
#[derive(Debug, Clone)]
pub enum Probe {
    Hit(Lookup),
    Miss,
    /// The site no longer caches; go to the shared cache or the resolver.
    Megamorphic,
}

/// Effect of recording a fresh resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing stored (megamorphic site, or an older result lost a race).
    Unchanged,
    Initialized,
    /// Stale entry for the same key overwritten.
    Refreshed,
    /// Entry added to a polymorphic site.
    Extended,
    ToPolymorphic,
    ToMegamorphic,
}

// =============================================================================
// Call Site
// =============================================================================

/// Whether a site dispatches a plain call or a `super` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Normal,
    Super,
}

/// Inline cache for one call location.
///
/// Shared across threads; readers take the state lock in read mode only.
#[derive(Debug)]
pub struct CallSite {
    name: Symbol,
    kind: CallKind,
    state: RwLock<SiteState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CallSite {
    /// Site for a plain call of `name`.
    pub fn new(name: Symbol) -> Self {
        Self::with_kind(name, CallKind::Normal)
    }

    /// Site for `super` inside a method called `name`. Entries are keyed by
    /// receiver type and the defining type of the running method.
    pub fn super_site(name: Symbol) -> Self {
        Self::with_kind(name, CallKind::Super)
    }

    fn with_kind(name: Symbol, kind: CallKind) -> Self {
        Self {
            name,
            kind,
            state: RwLock::new(SiteState::Uninitialized),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    #[inline]
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    #[inline]
    pub fn is_super(&self) -> bool {
        self.kind == CallKind::Super
    }

    pub fn state_kind(&self) -> SiteStateKind {
        self.state.read().kind()
    }

    /// Number of receiver keys currently cached.
    pub fn entry_count(&self) -> usize {
        match &*self.state.read() {
            SiteState::Uninitialized | SiteState::Megamorphic => 0,
            SiteState::Monomorphic(_) => 1,
            SiteState::Polymorphic(entries) => entries.len(),
        }
    }

    /// Forget everything, including megamorphic status.
    pub fn reset(&self) {
        *self.state.write() = SiteState::Uninitialized;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Look for an entry matching the key and `generation`.
    #[inline]
    pub fn probe(&self, receiver: TypeId, defined_in: Option<TypeId>, generation: u64) -> Probe {
        let state = self.state.read();
        let found = match &*state {
            SiteState::Uninitialized => None,
            SiteState::Monomorphic(entry) => Some(entry)
                .filter(|entry| entry.same_key(receiver, defined_in) && entry.generation == generation),
            SiteState::Polymorphic(entries) => entries
                .iter()
                .find(|entry| entry.same_key(receiver, defined_in) && entry.generation == generation),
            SiteState::Megamorphic => return Probe::Megamorphic,
        };

        match found {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Probe::Hit(entry.outcome.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Probe::Miss
            }
        }
    }

    /// Store a fresh resolution and advance the state machine.
    ///
    /// `capacity` bounds the polymorphic list; a site that would need one
    /// more slot becomes megamorphic and drops its entries.
    pub fn record(&self, entry: CacheEntry, capacity: usize) -> Transition {
        let mut state = self.state.write();
        match &mut *state {
            SiteState::Uninitialized => {
                *state = SiteState::Monomorphic(entry);
                Transition::Initialized
            }
            SiteState::Monomorphic(current) => {
                if current.same_key(entry.receiver, entry.defined_in) {
                    return replace_if_newer(current, entry);
                }
                if capacity < 2 {
                    *state = SiteState::Megamorphic;
                    return Transition::ToMegamorphic;
                }
                let mut entries = PolyEntries::new();
                entries.push(current.clone());
                entries.push(entry);
                *state = SiteState::Polymorphic(entries);
                Transition::ToPolymorphic
            }
            SiteState::Polymorphic(entries) => {
                if let Some(current) = entries
                    .iter_mut()
                    .find(|current| current.same_key(entry.receiver, entry.defined_in))
                {
                    return replace_if_newer(current, entry);
                }
                if entries.len() >= capacity {
                    *state = SiteState::Megamorphic;
                    return Transition::ToMegamorphic;
                }
                entries.push(entry);
                Transition::Extended
            }
            SiteState::Megamorphic => Transition::Unchanged,
        }
    }
}

/// Concurrent misses may finish out of order; keep the newest generation.
fn replace_if_newer(current: &mut CacheEntry, entry: CacheEntry) -> Transition {
    if entry.generation >= current.generation {
        *current = entry;
        Transition::Refreshed
    } else {
        Transition::Unchanged
    }
}
