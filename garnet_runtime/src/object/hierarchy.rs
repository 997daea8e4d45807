//! Hierarchy graph: superclass edges and mixin lists.
//!
//! Each type stores its outgoing edges (superclass, prepends, includes)
//! and the reverse edges needed for invalidation (subclasses, and for
//! modules, every type that includes or prepends them). All edits run
//! under the registry's structure lock and end with a generation bump of
//! the edited type and everything that inherits from it.

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::mro::{MixinEdges, ModuleList};
use crate::object::registry::TypeRegistry;
use crate::object::type_obj::{TypeFlags, TypeId, TypeKind};
use smallvec::SmallVec;
use tracing::debug;

/// Reverse-edge list. Most types have few direct dependents.
pub type DependentList = SmallVec<[TypeId; 4]>;

/// Edges stored on one type record.
#[derive(Debug, Clone, Default)]
pub struct Links {
    pub superclass: Option<TypeId>,
    /// Most recently prepended first.
    pub prepends: ModuleList,
    /// Most recently included first.
    pub includes: ModuleList,
    /// Types whose superclass is this type.
    pub subclasses: DependentList,
    /// Types that include or prepend this module.
    pub includers: DependentList,
    pub metaclass: Option<TypeId>,
}

impl Links {
    /// The subset of edges linearization reads.
    pub fn mixin_edges(&self) -> MixinEdges {
        MixinEdges {
            superclass: self.superclass,
            prepends: self.prepends.clone(),
            includes: self.includes.clone(),
        }
    }
}

/// Where a module is inserted relative to the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MixinKind {
    Include,
    Prepend,
}

impl TypeRegistry {
    /// Point `ty`'s superclass edge at `superclass`.
    ///
    /// Fails without changing anything if either side is a module or if
    /// `ty` is already an ancestor of `superclass`.
    pub fn add_superclass(&self, ty: TypeId, superclass: TypeId) -> RuntimeResult<()> {
        let _guard = self.lock_structure();
        let record = self.record(ty)?;
        let parent = self.record(superclass)?;

        if !record.kind().has_superclass() {
            return Err(RuntimeError::NotAClass(ty));
        }
        if !parent.kind().has_superclass() {
            return Err(RuntimeError::NotAClass(superclass));
        }
        record.ensure_mutable()?;
        if ty == superclass || self.compute_mro(superclass)?.contains(&ty) {
            return Err(RuntimeError::CyclicHierarchy {
                ty,
                other: superclass,
            });
        }

        let previous = record.superclass();
        if previous == Some(superclass) {
            return Ok(());
        }
        self.relink_superclass_locked(ty, previous, superclass)?;

        // A class's metaclass keeps inheriting from its superclass's.
        let metaclass = match record.kind() {
            TypeKind::Class => record.links.read().metaclass,
            _ => None,
        };
        let metaclass_move = match metaclass {
            Some(meta) => {
                let meta_super = self.metaclass_locked(superclass)?;
                let meta_previous = self.record(meta)?.superclass();
                if meta_previous != Some(meta_super) {
                    self.relink_superclass_locked(meta, meta_previous, meta_super)?;
                }
                Some(meta)
            }
            None => None,
        };

        let generation = self.tracker().advance();
        self.publish_locked(ty, generation)?;
        if let Some(meta) = metaclass_move {
            self.publish_locked(meta, generation)?;
        }
        debug!(
            target: "garnet::hierarchy",
            ty = %ty,
            superclass = %superclass,
            previous = ?previous,
            metaclass = ?metaclass_move,
            generation,
            "superclass changed"
        );
        Ok(())
    }

    /// Swap `ty`'s superclass edge and move the matching subclass edge.
    fn relink_superclass_locked(
        &self,
        ty: TypeId,
        previous: Option<TypeId>,
        superclass: TypeId,
    ) -> RuntimeResult<()> {
        let record = self.record(ty)?;
        let parent = self.record(superclass)?;
        let previous_parent = previous.map(|id| self.record(id)).transpose()?;

        record.links.write().superclass = Some(superclass);
        if let Some(old) = previous_parent {
            old.links.write().subclasses.retain(|id| *id != ty);
        }
        parent.links.write().subclasses.push(ty);
        Ok(())
    }

    /// Insert `module` right after `ty` in its ancestors.
    pub fn include_module(&self, ty: TypeId, module: TypeId) -> RuntimeResult<()> {
        self.mix_in(ty, &[module], MixinKind::Include)
    }

    /// Insert `module` right before `ty` in its ancestors.
    pub fn prepend_module(&self, ty: TypeId, module: TypeId) -> RuntimeResult<()> {
        self.mix_in(ty, &[module], MixinKind::Prepend)
    }

    /// Multi-argument `include`: the first module listed ends up nearest
    /// to `ty`. On error nothing is mixed in; on success readers never
    /// observe a subset of `modules`.
    pub fn include_modules(&self, ty: TypeId, modules: &[TypeId]) -> RuntimeResult<()> {
        self.mix_in(ty, modules, MixinKind::Include)
    }

    /// Multi-argument `prepend`, same ordering rule as `include_modules`.
    pub fn prepend_modules(&self, ty: TypeId, modules: &[TypeId]) -> RuntimeResult<()> {
        self.mix_in(ty, modules, MixinKind::Prepend)
    }

    fn mix_in(&self, ty: TypeId, modules: &[TypeId], kind: MixinKind) -> RuntimeResult<()> {
        let _guard = self.lock_structure();
        let record = self.record(ty)?;
        record.ensure_mutable()?;
        for &module in modules {
            self.check_mixin_locked(ty, module)?;
        }

        let added = self.attach_mixins_locked(ty, modules, kind)?;
        if kind == MixinKind::Prepend && !modules.is_empty() {
            record.add_flags(TypeFlags::HAS_PREPENDS);
        }

        // Re-mixing an existing module adds no edge but still busts caches.
        let generation = self.bump_locked(ty)?;
        debug!(
            target: "garnet::hierarchy",
            ty = %ty,
            modules = ?modules,
            kind = ?kind,
            added,
            generation,
            "modules mixed in"
        );
        Ok(())
    }

    fn check_mixin_locked(&self, ty: TypeId, module: TypeId) -> RuntimeResult<()> {
        let module_record = self.record(module)?;
        if !module_record.kind().is_module() {
            return Err(RuntimeError::NotAModule(module));
        }
        if ty == module || self.compute_mro(module)?.contains(&ty) {
            return Err(RuntimeError::CyclicHierarchy { ty, other: module });
        }
        Ok(())
    }

    /// Record the edge pairs for every module not already mixed in the
    /// same way. Back edges go in first; the forward list is swapped in
    /// under one write so readers see all of the new modules or none.
    fn attach_mixins_locked(&self, ty: TypeId, modules: &[TypeId], kind: MixinKind) -> RuntimeResult<usize> {
        let record = self.record(ty)?;
        let mut list = {
            let links = record.links.read();
            match kind {
                MixinKind::Include => links.includes.clone(),
                MixinKind::Prepend => links.prepends.clone(),
            }
        };

        let mut added = 0usize;
        for &module in modules.iter().rev() {
            if list.contains(&module) {
                continue;
            }
            list.insert(0, module);
            added += 1;

            let module_record = self.record(module)?;
            let mut module_links = module_record.links.write();
            if !module_links.includers.contains(&ty) {
                module_links.includers.push(ty);
            }
        }

        if added > 0 {
            let mut links = record.links.write();
            match kind {
                MixinKind::Include => links.includes = list,
                MixinKind::Prepend => links.prepends = list,
            }
        }
        Ok(added)
    }

    /// Modules directly included into `ty`, most recent first.
    pub fn included_modules(&self, ty: TypeId) -> RuntimeResult<Vec<TypeId>> {
        Ok(self.record(ty)?.links.read().includes.to_vec())
    }

    /// Modules directly prepended to `ty`, most recent first.
    pub fn prepended_modules(&self, ty: TypeId) -> RuntimeResult<Vec<TypeId>> {
        Ok(self.record(ty)?.links.read().prepends.to_vec())
    }
}
