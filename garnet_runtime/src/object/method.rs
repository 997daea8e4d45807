//! Method entries and per-type method tables.
//!
//! Entries are immutable once built. Redefinition, aliasing and visibility
//! changes all replace the `Arc<MethodEntry>` stored in the table, so a
//! reader holding an entry never observes a half-updated body.
//!
//! # Table Layout
//!
//! ```text
//! MethodTable
//! └── RwLock<FxHashMap<Symbol, Arc<MethodEntry>>>
//!         ├── Callable   - a real body
//!         ├── Undefined  - `undef_method` tombstone, stops lookup
//!         └── Inherit    - visibility override, lookup continues upward
//! ```

use crate::object::symbol::Symbol;
use crate::object::type_obj::TypeId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Visibility
// =============================================================================

/// Method visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        })
    }
}

// =============================================================================
// Callable
// =============================================================================

/// Opaque reference to an executable method body.
///
/// The dispatch core never looks inside; the embedding runtime stores
/// whatever it executes (bytecode handle, native fn, closure) and gets it
/// back with [`Callable::downcast_ref`].
#[derive(Clone)]
pub struct Callable(Arc<dyn Any + Send + Sync>);

impl Callable {
    /// Wrap a body.
    pub fn new<T: Any + Send + Sync>(body: T) -> Self {
        Self(Arc::new(body))
    }

    /// Borrow the body as its concrete type.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Identity comparison: true when both refer to the same body.
    #[inline]
    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// =============================================================================
// Method Entry
// =============================================================================

/// What a method table slot holds.
#[derive(Debug, Clone)]
pub enum MethodBody {
    /// A real method body.
    Callable(Callable),
    /// Written by `undef_method`; lookup stops here and reports not-found.
    Undefined,
    /// Written by a visibility change on an inherited method; lookup keeps
    /// walking but the first override's visibility wins.
    Inherit,
}

/// One method table slot.
#[derive(Debug)]
pub struct MethodEntry {
    name: Symbol,
    owner: TypeId,
    visibility: Visibility,
    body: MethodBody,
    /// Name the body was originally defined under, for aliases.
    original_name: Option<Symbol>,
    defined_in_generation: u64,
}

impl MethodEntry {
    /// Create an entry owned by `owner`.
    pub fn new(
        owner: TypeId,
        name: Symbol,
        body: MethodBody,
        visibility: Visibility,
        generation: u64,
    ) -> Self {
        Self {
            name,
            owner,
            visibility,
            body,
            original_name: None,
            defined_in_generation: generation,
        }
    }

    /// Copy of this entry stored under another name in `owner`'s table.
    ///
    /// The body is shared, not re-resolved: later redefinition of the
    /// original name does not affect the alias.
    pub fn aliased(&self, owner: TypeId, new_name: Symbol, generation: u64) -> Self {
        Self {
            name: new_name,
            owner,
            visibility: self.visibility,
            body: self.body.clone(),
            original_name: Some(self.original_name.unwrap_or(self.name)),
            defined_in_generation: generation,
        }
    }

    /// Copy of this entry with a different visibility.
    pub fn with_visibility(&self, visibility: Visibility, generation: u64) -> Self {
        Self {
            name: self.name,
            owner: self.owner,
            visibility,
            body: self.body.clone(),
            original_name: self.original_name,
            defined_in_generation: generation,
        }
    }

    #[inline]
    pub fn name(&self) -> Symbol {
        self.name
    }

    /// Type whose table holds this entry.
    #[inline]
    pub fn owner(&self) -> TypeId {
        self.owner
    }

    #[inline]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[inline]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// The body, if this entry holds one.
    #[inline]
    pub fn callable(&self) -> Option<&Callable> {
        match &self.body {
            MethodBody::Callable(callable) => Some(callable),
            _ => None,
        }
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self.body, MethodBody::Undefined)
    }

    #[inline]
    pub fn original_name(&self) -> Option<Symbol> {
        self.original_name
    }

    /// Generation stamped by the mutation that created this entry.
    #[inline]
    pub fn defined_in_generation(&self) -> u64 {
        self.defined_in_generation
    }
}

// =============================================================================
// Method Table
// =============================================================================

/// Per-type mapping from method name to entry.
#[derive(Debug, Default)]
pub struct MethodTable {
    entries: RwLock<FxHashMap<Symbol, Arc<MethodEntry>>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, name: Symbol) -> Option<Arc<MethodEntry>> {
        self.entries.read().get(&name).cloned()
    }

    /// Insert or replace, returning the previous entry.
    #[inline]
    pub fn insert(&self, entry: Arc<MethodEntry>) -> Option<Arc<MethodEntry>> {
        self.entries.write().insert(entry.name(), entry)
    }

    #[inline]
    pub fn remove(&self, name: Symbol) -> Option<Arc<MethodEntry>> {
        self.entries.write().remove(&name)
    }

    #[inline]
    pub fn contains(&self, name: Symbol) -> bool {
        self.entries.read().contains_key(&name)
    }

    /// Names of every slot, tombstones included.
    pub fn names(&self) -> Vec<Symbol> {
        self.entries.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
