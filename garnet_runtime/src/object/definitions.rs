//! Method-table mutation API.
//!
//! Every operation follows the same sequence under the structure lock:
//! validate, draw a generation, write the table, publish the generation
//! to the owning type and its dependents. A rejected operation draws no
//! generation.

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::method::{Callable, MethodBody, MethodEntry, Visibility};
use crate::object::registry::{TypeRecord, TypeRegistry};
use crate::object::symbol::Symbol;
use crate::object::type_obj::TypeId;
use std::sync::Arc;
use tracing::debug;

impl TypeRegistry {
    /// Define or redefine `name` on `ty`.
    pub fn define_method(
        &self,
        ty: TypeId,
        name: Symbol,
        body: Callable,
        visibility: Visibility,
    ) -> RuntimeResult<Arc<MethodEntry>> {
        let _guard = self.lock_structure();
        let record = self.mutable_record(ty)?;
        let generation = self.tracker().advance();
        let entry = Arc::new(MethodEntry::new(
            ty,
            name,
            MethodBody::Callable(body),
            visibility,
            generation,
        ));
        let replaced = record.methods.insert(entry.clone()).is_some();
        self.publish_locked(ty, generation)?;

        debug!(
            target: "garnet::methods",
            ty = %ty,
            name = %name,
            visibility = %visibility,
            replaced,
            generation,
            "method defined"
        );
        Ok(entry)
    }

    /// Store the entry `existing` currently resolves to under `new_name`.
    ///
    /// The alias keeps pointing at that body when `existing` is later
    /// redefined.
    pub fn alias_method(
        &self,
        ty: TypeId,
        new_name: Symbol,
        existing: Symbol,
    ) -> RuntimeResult<Option<Arc<MethodEntry>>> {
        let _guard = self.lock_structure();
        let record = self.mutable_record(ty)?;
        if new_name == existing {
            return Ok(None);
        }
        let target = self
            .resolve(ty, existing)
            .map_err(|_| RuntimeError::NameError { ty, name: existing })?;

        let generation = self.tracker().advance();
        let entry = Arc::new(
            target
                .entry
                .aliased(ty, new_name, generation)
                .with_visibility(target.visibility, generation),
        );
        record.methods.insert(entry.clone());
        self.publish_locked(ty, generation)?;

        debug!(
            target: "garnet::methods",
            ty = %ty,
            name = %new_name,
            original = %existing,
            source = %target.owner(),
            generation,
            "method aliased"
        );
        Ok(Some(entry))
    }

    /// Delete `name` from `ty`'s own table. Lookups fall through to
    /// ancestors afterwards.
    ///
    /// An undef marker is not a definition and cannot be removed; a
    /// visibility override can, restoring the inherited visibility.
    pub fn remove_method(&self, ty: TypeId, name: Symbol) -> RuntimeResult<Arc<MethodEntry>> {
        let _guard = self.lock_structure();
        let record = self.mutable_record(ty)?;
        if record.methods.get(name).is_none_or(|entry| entry.is_undefined()) {
            return Err(RuntimeError::NameError { ty, name });
        }

        let generation = self.tracker().advance();
        let removed = record
            .methods
            .remove(name)
            .ok_or(RuntimeError::NameError { ty, name })?;
        self.publish_locked(ty, generation)?;

        debug!(target: "garnet::methods", ty = %ty, name = %name, generation, "method removed");
        Ok(removed)
    }

    /// Hide `name` for `ty` and everything inheriting from it, even when an
    /// ancestor defines it.
    pub fn undef_method(&self, ty: TypeId, name: Symbol) -> RuntimeResult<()> {
        let _guard = self.lock_structure();
        let record = self.mutable_record(ty)?;
        if self.resolve(ty, name).is_err() {
            return Err(RuntimeError::NameError { ty, name });
        }

        let generation = self.tracker().advance();
        let tombstone = MethodEntry::new(ty, name, MethodBody::Undefined, Visibility::Public, generation);
        record.methods.insert(Arc::new(tombstone));
        self.publish_locked(ty, generation)?;

        debug!(target: "garnet::methods", ty = %ty, name = %name, generation, "method undefined");
        Ok(())
    }

    /// Change the visibility of `name` as seen through `ty`.
    ///
    /// A method defined on `ty` itself gets a replacement entry. An
    /// inherited method gets an override entry on `ty` that leaves the
    /// ancestor's body in charge.
    pub fn set_visibility(&self, ty: TypeId, name: Symbol, visibility: Visibility) -> RuntimeResult<()> {
        let _guard = self.lock_structure();
        let record = self.mutable_record(ty)?;
        let resolved = self
            .resolve(ty, name)
            .map_err(|_| RuntimeError::NameError { ty, name })?;
        if resolved.visibility == visibility {
            return Ok(());
        }

        let generation = self.tracker().advance();
        let entry = match record.methods.get(name) {
            Some(local) => local.with_visibility(visibility, generation),
            None => MethodEntry::new(ty, name, MethodBody::Inherit, visibility, generation),
        };
        record.methods.insert(Arc::new(entry));
        self.publish_locked(ty, generation)?;

        debug!(
            target: "garnet::methods",
            ty = %ty,
            name = %name,
            visibility = %visibility,
            generation,
            "visibility changed"
        );
        Ok(())
    }

    fn mutable_record(&self, ty: TypeId) -> RuntimeResult<Arc<TypeRecord>> {
        let record = self.record(ty)?;
        record.ensure_mutable()?;
        Ok(record)
    }
}
