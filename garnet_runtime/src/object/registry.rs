//! Type registry: the arena that owns every type descriptor.
//!
//! Types live in a flat arena indexed by `TypeId`. Superclass, mixin,
//! subclass and including-type relationships are stored as id lists on
//! the owning record, so no descriptor holds a reference to another.
//!
//! # Locking
//!
//! ```text
//! structure: Mutex<()>          serializes every mutation, never taken by readers
//! types:     boxcar::Vec<..>    append-only arena, lock-free to index
//! links:     RwLock<Links>      per type, hierarchy edges
//! methods:   MethodTable        per type, its own RwLock
//! generation AtomicU64          per type, stamped after each mutation
//! ```
//!
//! Appends happen under the structure lock, so arena slot `n` always
//! holds `TypeId(n)`. Reading a generation never blocks on a mutation.

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::generation::InvalidationTracker;
use crate::object::hierarchy::Links;
use crate::object::method::{MethodTable, Visibility};
use crate::object::resolver::MroSnapshot;
use crate::object::symbol::Symbol;
use crate::object::type_obj::{TypeFlags, TypeId, TypeKind};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

// =============================================================================
// Type Record
// =============================================================================

/// Descriptor for one class, module or singleton class.
#[derive(Debug)]
pub struct TypeRecord {
    id: TypeId,
    name: String,
    kind: TypeKind,
    /// For metaclasses, the class or module they are attached to.
    attached: Option<TypeId>,
    flags: AtomicU32,
    pub(crate) links: RwLock<Links>,
    pub(crate) methods: MethodTable,
    pub(crate) generation: AtomicU64,
    pub(crate) mro_cache: RwLock<Option<MroSnapshot>>,
}

impl TypeRecord {
    fn new(
        id: TypeId,
        name: String,
        kind: TypeKind,
        attached: Option<TypeId>,
        superclass: Option<TypeId>,
        generation: u64,
    ) -> Self {
        Self {
            id,
            name,
            kind,
            attached,
            flags: AtomicU32::new(0),
            links: RwLock::new(Links {
                superclass,
                ..Links::default()
            }),
            methods: MethodTable::new(),
            generation: AtomicU64::new(generation),
            mro_cache: RwLock::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Class or module a metaclass is attached to.
    #[inline]
    pub fn attached(&self) -> Option<TypeId> {
        self.attached
    }

    #[inline]
    pub fn flags(&self) -> TypeFlags {
        TypeFlags::from_bits_retain(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn add_flags(&self, flags: TypeFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.flags().contains(TypeFlags::FROZEN)
    }

    /// Generation last stamped on this type.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    #[inline]
    pub fn superclass(&self) -> Option<TypeId> {
        self.links.read().superclass
    }

    /// Method table of this type alone (no inheritance).
    #[inline]
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    pub(crate) fn ensure_mutable(&self) -> RuntimeResult<()> {
        if self.is_frozen() {
            Err(RuntimeError::Frozen(self.id))
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Type Registry
// =============================================================================

/// Owner of every type descriptor and the single entry point for mutation.
#[derive(Debug)]
pub struct TypeRegistry {
    types: boxcar::Vec<Arc<TypeRecord>>,
    structure: Mutex<()>,
    tracker: InvalidationTracker,
}

impl TypeRegistry {
    /// Create a registry holding the bootstrapped root types:
    /// `BasicObject`, `Object < BasicObject`, `Module < Object`,
    /// `Class < Module`.
    pub fn new() -> Self {
        let registry = Self {
            types: boxcar::Vec::new(),
            structure: Mutex::new(()),
            tracker: InvalidationTracker::new(),
        };

        {
            let _guard = registry.lock_structure();
            let roots = [
                ("BasicObject", None),
                ("Object", Some(TypeId::BASIC_OBJECT)),
                ("Module", Some(TypeId::OBJECT)),
                ("Class", Some(TypeId::MODULE)),
            ];
            for (name, superclass) in roots {
                let record = registry.alloc_locked(name.to_owned(), TypeKind::Class, None, superclass);
                record.add_flags(TypeFlags::BUILTIN);
            }
        }

        registry
    }

    #[inline]
    pub(crate) fn lock_structure(&self) -> MutexGuard<'_, ()> {
        self.structure.lock()
    }

    #[inline]
    pub(crate) fn tracker(&self) -> &InvalidationTracker {
        &self.tracker
    }

    /// Global generation counter; advances once per successful mutation.
    #[inline]
    pub fn global_generation(&self) -> u64 {
        self.tracker.current()
    }

    /// Look up a type descriptor.
    #[inline]
    pub fn get(&self, ty: TypeId) -> Option<Arc<TypeRecord>> {
        self.types.get(ty.index()).cloned()
    }

    #[inline]
    pub(crate) fn record(&self, ty: TypeId) -> RuntimeResult<Arc<TypeRecord>> {
        self.get(ty).ok_or(RuntimeError::UnknownType(ty))
    }

    /// Look up several descriptors at once.
    pub(crate) fn records(&self, ids: &[TypeId]) -> RuntimeResult<Vec<Arc<TypeRecord>>> {
        ids.iter().map(|&id| self.record(id)).collect()
    }

    /// Current generation of a type. This is the value call sites compare
    /// their snapshots against: an arena index plus one atomic load, no
    /// lock taken.
    #[inline]
    pub fn current_generation(&self, ty: TypeId) -> RuntimeResult<u64> {
        self.types
            .get(ty.index())
            .map(|record| record.generation())
            .ok_or(RuntimeError::UnknownType(ty))
    }

    #[inline]
    pub fn contains(&self, ty: TypeId) -> bool {
        self.types.get(ty.index()).is_some()
    }

    /// Number of registered types, roots included.
    pub fn len(&self) -> usize {
        self.types.count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a new descriptor. Caller holds the structure lock.
    fn alloc_locked(
        &self,
        name: String,
        kind: TypeKind,
        attached: Option<TypeId>,
        superclass: Option<TypeId>,
    ) -> Arc<TypeRecord> {
        let generation = self.tracker.current();
        let id = TypeId::from_raw(self.types.count() as u32);
        let record = Arc::new(TypeRecord::new(id, name, kind, attached, superclass, generation));
        let slot = self.types.push(record.clone());
        debug_assert_eq!(slot, id.index());

        if let Some(superclass) = superclass {
            if let Some(parent) = self.get(superclass) {
                parent.links.write().subclasses.push(record.id());
            }
        }

        debug!(
            target: "garnet::hierarchy",
            ty = %record.id(),
            name = record.name(),
            kind = ?kind,
            superclass = ?superclass,
            "type created"
        );
        record
    }

    // =========================================================================
    // Type Creation
    // =========================================================================

    /// Create a class. `None` means `Object`.
    pub fn define_class(&self, name: &str, superclass: Option<TypeId>) -> RuntimeResult<TypeId> {
        let superclass = superclass.unwrap_or(TypeId::OBJECT);
        let _guard = self.lock_structure();
        let parent = self.record(superclass)?;
        if !parent.kind().has_superclass() {
            return Err(RuntimeError::NotAClass(superclass));
        }
        Ok(self
            .alloc_locked(name.to_owned(), TypeKind::Class, None, Some(superclass))
            .id())
    }

    /// Create a module.
    pub fn define_module(&self, name: &str) -> TypeId {
        let _guard = self.lock_structure();
        self.alloc_locked(name.to_owned(), TypeKind::Module, None, None).id()
    }

    /// Create a fresh singleton class for one instance of `klass`.
    ///
    /// Object identity is the caller's concern: the caller keeps the
    /// returned id as that object's type from now on.
    pub fn singleton_class_of_instance(&self, klass: TypeId) -> RuntimeResult<TypeId> {
        let _guard = self.lock_structure();
        let parent = self.record(klass)?;
        if parent.kind().is_module() {
            return Err(RuntimeError::NotAClass(klass));
        }
        let name = format!("#<Class:#<{}>>", parent.name());
        Ok(self
            .alloc_locked(name, TypeKind::Singleton, None, Some(klass))
            .id())
    }

    /// Singleton class of a class or module, created on first request.
    ///
    /// A class's metaclass inherits from its superclass's metaclass
    /// (`Class` at the root); a module's metaclass inherits from `Module`.
    pub fn metaclass(&self, ty: TypeId) -> RuntimeResult<TypeId> {
        let _guard = self.lock_structure();
        self.metaclass_locked(ty)
    }

    pub(crate) fn metaclass_locked(&self, ty: TypeId) -> RuntimeResult<TypeId> {
        let record = self.record(ty)?;
        let (existing, superclass) = {
            let links = record.links.read();
            (links.metaclass, links.superclass)
        };
        if let Some(metaclass) = existing {
            return Ok(metaclass);
        }

        let meta_super = match record.kind() {
            TypeKind::Module => TypeId::MODULE,
            TypeKind::Singleton => TypeId::CLASS,
            TypeKind::Class => match superclass {
                Some(parent) => self.metaclass_locked(parent)?,
                None => TypeId::CLASS,
            },
        };

        let name = format!("#<Class:{}>", record.name());
        let metaclass = self
            .alloc_locked(name, TypeKind::Singleton, Some(ty), Some(meta_super))
            .id();
        record.links.write().metaclass = Some(metaclass);
        record.add_flags(TypeFlags::HAS_METACLASS);
        Ok(metaclass)
    }

    /// Forbid further method-table and hierarchy changes on `ty`.
    pub fn freeze(&self, ty: TypeId) -> RuntimeResult<()> {
        let _guard = self.lock_structure();
        self.record(ty)?.add_flags(TypeFlags::FROZEN);
        debug!(target: "garnet::hierarchy", ty = %ty, "type frozen");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn name(&self, ty: TypeId) -> RuntimeResult<String> {
        Ok(self.record(ty)?.name().to_owned())
    }

    pub fn kind(&self, ty: TypeId) -> RuntimeResult<TypeKind> {
        Ok(self.record(ty)?.kind())
    }

    pub fn superclass(&self, ty: TypeId) -> RuntimeResult<Option<TypeId>> {
        Ok(self.record(ty)?.superclass())
    }

    pub fn is_frozen(&self, ty: TypeId) -> RuntimeResult<bool> {
        Ok(self.record(ty)?.is_frozen())
    }

    /// Types whose superclass edge points at `ty`.
    pub fn direct_subclasses(&self, ty: TypeId) -> RuntimeResult<Vec<TypeId>> {
        Ok(self.record(ty)?.links.read().subclasses.to_vec())
    }

    /// `ty` inherits from, or mixes in, `ancestor`.
    pub fn is_subtype(&self, ty: TypeId, ancestor: TypeId) -> RuntimeResult<bool> {
        Ok(self.mro(ty)?.contains(&ancestor))
    }

    /// Ruby's `include?`: `module` is a module somewhere in `ty`'s
    /// ancestors other than `ty` itself.
    pub fn includes_module(&self, ty: TypeId, module: TypeId) -> RuntimeResult<bool> {
        if ty == module || !self.record(module)?.kind().is_module() {
            return Ok(false);
        }
        self.is_subtype(ty, module)
    }

    /// Names of callable, non-private methods, sorted by name.
    ///
    /// With `inherit`, every ancestor contributes; otherwise only names
    /// present in `ty`'s own table.
    pub fn instance_methods(&self, ty: TypeId, inherit: bool) -> RuntimeResult<Vec<Symbol>> {
        let record = self.record(ty)?;
        let mut candidates = if inherit {
            let mro = self.mro(ty)?;
            let mut names = Vec::new();
            for ancestor in self.records(&mro)? {
                names.extend(ancestor.methods.names());
            }
            names
        } else {
            record.methods.names()
        };
        candidates.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        candidates.dedup();

        Ok(candidates
            .into_iter()
            .filter(|&name| {
                self.resolve(ty, name)
                    .is_ok_and(|resolved| resolved.visibility != Visibility::Private)
            })
            .collect())
    }

    /// Visibility of `name` as seen from `ty`, if it resolves.
    pub fn method_defined(
        &self,
        ty: TypeId,
        name: Symbol,
        inherit: bool,
    ) -> RuntimeResult<Option<Visibility>> {
        let record = self.record(ty)?;
        if !inherit && !record.methods.contains(name) {
            return Ok(None);
        }
        Ok(self.resolve(ty, name).ok().map(|resolved| resolved.visibility))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Global Registry Access
// =============================================================================

/// Global type registry singleton.
static GLOBAL_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Get the global type registry, bootstrapping it on first use.
pub fn global_registry() -> &'static TypeRegistry {
    GLOBAL_REGISTRY.get_or_init(TypeRegistry::new)
}
