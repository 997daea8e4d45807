//! Method resolution over linearized ancestors.
//!
//! `resolve` scans a type's MRO front to back and returns the first table
//! entry with a callable body. `resolve_super` does the same starting just
//! past the defining type of the running method, which is how `super`
//! chains thread through prepended and included modules.
//!
//! Two non-callable bodies affect the scan:
//!
//! - `Undefined` stops it: the name is deliberately hidden from here on
//! - `Inherit` lets it continue but fixes the visibility the caller sees
//!
//! Resolution never enforces visibility. It reports the effective
//! visibility and leaves the policy to the dispatcher.

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::method::{MethodBody, MethodEntry, Visibility};
use crate::object::mro::{self, Mro};
use crate::object::registry::TypeRegistry;
use crate::object::symbol::Symbol;
use crate::object::type_obj::TypeId;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Results
// =============================================================================

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Entry holding the callable body.
    pub entry: Arc<MethodEntry>,
    /// Visibility after applying any override found before the entry.
    pub visibility: Visibility,
    /// Position of the entry's owner in the receiver's MRO.
    pub mro_index: usize,
}

impl Resolved {
    /// Type whose table holds the entry. `super` from the found body
    /// continues after this type.
    #[inline]
    pub fn owner(&self) -> TypeId {
        self.entry.owner()
    }

    /// Same entry, same effective visibility.
    pub fn same_target(&self, other: &Resolved) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry) && self.visibility == other.visibility
    }
}

/// Why a lookup produced no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The MRO was exhausted, or an undef tombstone was hit first.
    NotFound {
        ty: TypeId,
        name: Symbol,
        undefined: bool,
    },
    /// `super` was requested from a type that is not in the receiver's MRO.
    NoSuperclassPosition {
        ty: TypeId,
        defining: TypeId,
        name: Symbol,
    },
    Runtime(RuntimeError),
}

impl LookupError {
    /// A method-missing style fallback is appropriate.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound { .. })
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound {
                ty,
                name,
                undefined: false,
            } => write!(f, "undefined method '{}' for {}", name, ty),
            LookupError::NotFound {
                ty,
                name,
                undefined: true,
            } => write!(f, "method '{}' is undefined for {}", name, ty),
            LookupError::NoSuperclassPosition { ty, defining, name } => write!(
                f,
                "super from '{}': {} is not an ancestor of {}",
                name, defining, ty
            ),
            LookupError::Runtime(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RuntimeError> for LookupError {
    fn from(err: RuntimeError) -> Self {
        LookupError::Runtime(err)
    }
}

pub type Lookup = Result<Resolved, LookupError>;

// =============================================================================
// MRO Cache
// =============================================================================

/// Linearization of one type, valid while the type's generation matches.
#[derive(Debug, Clone)]
pub(crate) struct MroSnapshot {
    generation: u64,
    mro: Arc<[TypeId]>,
}

impl TypeRegistry {
    /// Linearize `ty` from the current edges, bypassing the MRO cache.
    pub fn compute_mro(&self, ty: TypeId) -> RuntimeResult<Mro> {
        self.record(ty)?;
        Ok(mro::compute_mro(ty, |id| {
            self.get(id).map(|record| record.links.read().mixin_edges())
        }))
    }

    /// Cached linearization of `ty`.
    pub fn mro(&self, ty: TypeId) -> RuntimeResult<Arc<[TypeId]>> {
        let record = self.record(ty)?;
        let generation = record.generation();
        if let Some(snapshot) = record.mro_cache.read().as_ref() {
            if snapshot.generation == generation {
                return Ok(snapshot.mro.clone());
            }
        }

        let mro: Arc<[TypeId]> = Arc::from(self.compute_mro(ty)?.as_slice());
        let mut cache = record.mro_cache.write();
        if cache.as_ref().is_none_or(|old| old.generation < generation) {
            *cache = Some(MroSnapshot {
                generation,
                mro: mro.clone(),
            });
        }
        Ok(mro)
    }

    /// Ruby's `ancestors`.
    pub fn ancestors(&self, ty: TypeId) -> RuntimeResult<Vec<TypeId>> {
        Ok(self.mro(ty)?.to_vec())
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find the entry `name` dispatches to on an instance of `ty`.
    pub fn resolve(&self, ty: TypeId, name: Symbol) -> Lookup {
        let mro = self.mro(ty)?;
        self.scan(ty, &mro, 0, name)
    }

    /// Full lookup that recomputes the linearization from the edges.
    pub fn resolve_uncached(&self, ty: TypeId, name: Symbol) -> Lookup {
        let mro = self.compute_mro(ty)?;
        self.scan(ty, &mro, 0, name)
    }

    /// Find what `super` inside a method owned by `defining` reaches when
    /// the receiver's type is `ty`.
    pub fn resolve_super(&self, ty: TypeId, defining: TypeId, name: Symbol) -> Lookup {
        let mro = self.mro(ty)?;
        let position = mro
            .iter()
            .position(|&id| id == defining)
            .ok_or(LookupError::NoSuperclassPosition { ty, defining, name })?;
        self.scan(ty, &mro, position + 1, name)
    }

    fn scan(&self, ty: TypeId, mro: &[TypeId], start: usize, name: Symbol) -> Lookup {
        let not_found = |undefined| LookupError::NotFound {
            ty,
            name,
            undefined,
        };
        let Some(tail) = mro.get(start..) else {
            return Err(not_found(false));
        };

        let mut visibility_override = None;
        for (offset, record) in self.records(tail)?.iter().enumerate() {
            let Some(entry) = record.methods.get(name) else {
                continue;
            };
            match entry.body() {
                MethodBody::Callable(_) => {
                    let visibility = visibility_override.unwrap_or(entry.visibility());
                    return Ok(Resolved {
                        entry,
                        visibility,
                        mro_index: start + offset,
                    });
                }
                MethodBody::Undefined => return Err(not_found(true)),
                MethodBody::Inherit => {
                    visibility_override.get_or_insert(entry.visibility());
                }
            }
        }

        Err(not_found(false))
    }
}
