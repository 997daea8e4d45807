//! Method dispatch through call-site caches.
//!
//! `Dispatcher` answers "which body runs for this call" and leaves running
//! it to the caller. The lookup path for a site:
//!
//! 1. Load the receiver type's current generation
//! 2. Probe the site with (receiver, generation)
//! 3. On a miss, try the shared method cache, then the resolver
//! 4. Record the result on the site under the generation from step 1
//!
//! Loading the generation first means a result can only ever be cached
//! under a generation at least as old as the state it was computed from.
//! A concurrent mutation publishes a newer generation, so the next probe
//! misses.

use crate::config::{ConfigError, DispatchConfig};
use crate::inline_cache::{CacheEntry, CallSite, Probe, Transition};
use crate::method_cache::MethodCache;
use crate::stats::DispatchStats;
use garnet_runtime::{
    Lookup, LookupError, Resolved, RuntimeError, Symbol, TypeId, TypeKind, TypeRegistry, Visibility,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Call Types and Errors
// =============================================================================

/// How the call expression names its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallType {
    /// `recv.foo`: explicit receiver.
    Normal,
    /// `foo(args)`: implicit self.
    Functional,
    /// `foo`: bare identifier, implicit self.
    Variable,
}

impl CallType {
    #[inline]
    pub fn is_implicit_self(self) -> bool {
        !matches!(self, CallType::Normal)
    }
}

/// Why a dispatch produced no callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Nothing in the receiver's ancestors defines the name. The caller
    /// may fall back to a method-missing hook.
    NoMethod {
        receiver: TypeId,
        name: Symbol,
        undefined: bool,
    },
    /// A method exists but this call may not reach it.
    Inaccessible {
        receiver: TypeId,
        name: Symbol,
        visibility: Visibility,
    },
    /// `super` found nothing past the defining type.
    NoSuperclassMethod {
        receiver: TypeId,
        defining: TypeId,
        name: Symbol,
    },
    Runtime(RuntimeError),
}

impl DispatchError {
    /// A method-missing fallback applies.
    pub fn is_method_missing(&self) -> bool {
        matches!(
            self,
            DispatchError::NoMethod { .. } | DispatchError::NoSuperclassMethod { .. }
        )
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoMethod { receiver, name, .. } => {
                write!(f, "undefined method '{}' for an instance of {}", name, receiver)
            }
            DispatchError::Inaccessible {
                receiver,
                name,
                visibility,
            } => write!(
                f,
                "{} method '{}' called for an instance of {}",
                visibility, name, receiver
            ),
            DispatchError::NoSuperclassMethod { name, defining, .. } => {
                write!(f, "super: no superclass method '{}' after {}", name, defining)
            }
            DispatchError::Runtime(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuntimeError> for DispatchError {
    fn from(err: RuntimeError) -> Self {
        DispatchError::Runtime(err)
    }
}

impl From<LookupError> for DispatchError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound {
                ty,
                name,
                undefined,
            } => DispatchError::NoMethod {
                receiver: ty,
                name,
                undefined,
            },
            LookupError::NoSuperclassPosition { ty, defining, name } => {
                DispatchError::NoSuperclassMethod {
                    receiver: ty,
                    defining,
                    name,
                }
            }
            LookupError::Runtime(err) => DispatchError::Runtime(err),
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

// =============================================================================
// Dispatcher
// =============================================================================

/// Resolves calls against one registry, caching per site and globally.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<TypeRegistry>,
    method_cache: MethodCache,
    config: DispatchConfig,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::build(registry, DispatchConfig::default())
    }

    pub fn with_config(registry: Arc<TypeRegistry>, config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(registry, config))
    }

    fn build(registry: Arc<TypeRegistry>, config: DispatchConfig) -> Self {
        Self {
            registry,
            method_cache: MethodCache::new(),
            config,
            stats: DispatchStats::new(),
        }
    }

    #[inline]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[inline]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    #[inline]
    pub fn method_cache(&self) -> &MethodCache {
        &self.method_cache
    }

    /// Entry to run for `site` on a receiver of type `receiver`, with no
    /// caller context. Protected methods are unreachable this way.
    #[inline]
    pub fn invoke(&self, site: &CallSite, receiver: TypeId, call_type: CallType) -> DispatchResult<Resolved> {
        self.invoke_from(site, receiver, call_type, None)
    }

    /// Like `invoke`, with the type of the calling frame's `self`.
    pub fn invoke_from(
        &self,
        site: &CallSite,
        receiver: TypeId,
        call_type: CallType,
        caller_self: Option<TypeId>,
    ) -> DispatchResult<Resolved> {
        debug_assert!(!site.is_super(), "plain dispatch through a super site");
        let resolved = self.lookup(site, receiver)?;
        self.check_visibility(&resolved, receiver, site.name(), call_type, caller_self)?;
        Ok(resolved)
    }

    /// Entry `super` reaches from a method owned by `defining`.
    ///
    /// No visibility check: `super` may call private ancestors.
    pub fn super_invoke(&self, site: &CallSite, receiver: TypeId, defining: TypeId) -> DispatchResult<Resolved> {
        debug_assert!(site.is_super(), "super dispatch through a plain site");
        self.cached_lookup(site, receiver, Some(defining))
            .map_err(|err| match err {
                LookupError::NotFound { ty, name, .. } => DispatchError::NoSuperclassMethod {
                    receiver: ty,
                    defining,
                    name,
                },
                other => other.into(),
            })
    }

    /// Cached resolution with no visibility policy applied.
    pub fn lookup(&self, site: &CallSite, receiver: TypeId) -> DispatchResult<Resolved> {
        Ok(self.cached_lookup(site, receiver, None)?)
    }

    fn check_visibility(
        &self,
        resolved: &Resolved,
        receiver: TypeId,
        name: Symbol,
        call_type: CallType,
        caller_self: Option<TypeId>,
    ) -> DispatchResult<()> {
        let allowed = match resolved.visibility {
            Visibility::Public => true,
            _ if call_type.is_implicit_self() => true,
            Visibility::Private => false,
            Visibility::Protected => match caller_self {
                Some(caller) => self.registry.is_subtype(caller, self.protection_scope(resolved.owner())?)?,
                None => false,
            },
        };

        if allowed {
            Ok(())
        } else {
            Err(DispatchError::Inaccessible {
                receiver,
                name,
                visibility: resolved.visibility,
            })
        }
    }

    /// Protected access is judged against the first non-singleton type at
    /// or above `owner`.
    fn protection_scope(&self, owner: TypeId) -> DispatchResult<TypeId> {
        let mut current = owner;
        while self.registry.kind(current)? == TypeKind::Singleton {
            match self.registry.superclass(current)? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(current)
    }

    // =========================================================================
    // Lookup Path
    // =========================================================================

    fn cached_lookup(&self, site: &CallSite, receiver: TypeId, defined_in: Option<TypeId>) -> Lookup {
        let generation = self.registry.current_generation(receiver)?;

        match site.probe(receiver, defined_in, generation) {
            Probe::Hit(outcome) => {
                DispatchStats::bump(&self.stats.site_hits);
                outcome
            }
            Probe::Miss => {
                DispatchStats::bump(&self.stats.site_misses);
                let outcome = self.slow_lookup(site.name(), receiver, defined_in, generation, false);
                if CacheEntry::is_cacheable(&outcome) {
                    let entry = CacheEntry {
                        receiver,
                        defined_in,
                        generation,
                        outcome: outcome.clone(),
                    };
                    let transition = site.record(entry, self.config.poly_capacity);
                    self.note_transition(site, receiver, generation, transition);
                }
                outcome
            }
            Probe::Megamorphic => {
                DispatchStats::bump(&self.stats.megamorphic_lookups);
                self.slow_lookup(site.name(), receiver, defined_in, generation, true)
            }
        }
    }

    fn slow_lookup(
        &self,
        name: Symbol,
        receiver: TypeId,
        defined_in: Option<TypeId>,
        generation: u64,
        megamorphic: bool,
    ) -> Lookup {
        let use_cache = self.config.uses_method_cache(megamorphic);
        let key = (receiver, name, defined_in);
        if use_cache {
            if let Some(outcome) = self.method_cache.get(key, generation) {
                DispatchStats::bump(&self.stats.method_cache_hits);
                return outcome;
            }
            DispatchStats::bump(&self.stats.method_cache_misses);
        }

        DispatchStats::bump(&self.stats.full_resolutions);
        let outcome = match defined_in {
            Some(defining) => self.registry.resolve_super(receiver, defining, name),
            None => self.registry.resolve(receiver, name),
        };
        if use_cache && CacheEntry::is_cacheable(&outcome) {
            self.method_cache.insert(key, generation, outcome.clone());
            if self.method_cache.len() > self.config.method_cache_limit {
                self.reclaim_method_cache();
            }
        }
        outcome
    }

    /// Sweep entries whose receiver type has moved on since they were
    /// filled; clear everything if that is not enough.
    fn reclaim_method_cache(&self) {
        let registry = &self.registry;
        let removed = self.method_cache.purge_stale(|ty, generation| {
            registry.current_generation(ty).is_ok_and(|current| current == generation)
        });
        let cleared = self.method_cache.len() > self.config.method_cache_limit;
        if cleared {
            self.method_cache.clear();
        }
        debug!(
            target: "garnet::ic",
            removed,
            cleared,
            limit = self.config.method_cache_limit,
            "method cache reclaimed"
        );
    }

    fn note_transition(&self, site: &CallSite, receiver: TypeId, generation: u64, transition: Transition) {
        let counter = match transition {
            Transition::Refreshed => &self.stats.refreshes,
            Transition::ToPolymorphic => &self.stats.to_polymorphic,
            Transition::ToMegamorphic => &self.stats.to_megamorphic,
            Transition::Unchanged | Transition::Initialized | Transition::Extended => return,
        };
        DispatchStats::bump(counter);
        debug!(
            target: "garnet::ic",
            name = %site.name(),
            kind = ?site.kind(),
            receiver = %receiver,
            generation,
            transition = ?transition,
            "call site transition"
        );
    }
}
