//! Ancestor linearization.
//!
//! The order for a type `T` is built depth-first:
//!
//! ```text
//! prepends(T), most recent first, each expanded recursively
//! T
//! includes(T), most recent first, each expanded recursively
//! linearization of superclass(T)
//! ```
//!
//! A type already placed is skipped, so the first occurrence wins. The
//! walk is a pure function of the edges it is handed.

use crate::object::type_obj::TypeId;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

/// Linearized ancestors. Most hierarchies fit inline.
pub type Mro = SmallVec<[TypeId; 8]>;

/// Mixin list, most recently added first.
pub type ModuleList = SmallVec<[TypeId; 4]>;

/// The edges of one type that linearization needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MixinEdges {
    pub superclass: Option<TypeId>,
    pub prepends: ModuleList,
    pub includes: ModuleList,
}

/// Compute the linearized ancestors of `ty`.
///
/// `edges` returns the edges of a type, or `None` for an unknown type,
/// which is then treated as having no edges.
pub fn compute_mro<F>(ty: TypeId, edges: F) -> Mro
where
    F: Fn(TypeId) -> Option<MixinEdges>,
{
    let mut mro = Mro::new();
    let mut placed = FxHashSet::default();
    let mut current = Some(ty);

    while let Some(class) = current {
        // A class seen twice means a malformed superclass cycle.
        if !placed.insert(class) {
            break;
        }
        let class_edges = edges(class).unwrap_or_default();
        place_with_mixins(class, &class_edges, &edges, &mut mro, &mut placed);
        current = class_edges.superclass;
    }

    mro
}

/// Place `ty` surrounded by its own prepends and includes.
///
/// `ty` must already be in `placed`; marking before recursing keeps a
/// malformed cyclic mixin graph from recursing forever.
fn place_with_mixins<F>(
    ty: TypeId,
    ty_edges: &MixinEdges,
    edges: &F,
    mro: &mut Mro,
    placed: &mut FxHashSet<TypeId>,
) where
    F: Fn(TypeId) -> Option<MixinEdges>,
{
    for &module in &ty_edges.prepends {
        place_module(module, edges, mro, placed);
    }
    mro.push(ty);
    for &module in &ty_edges.includes {
        place_module(module, edges, mro, placed);
    }
}

fn place_module<F>(module: TypeId, edges: &F, mro: &mut Mro, placed: &mut FxHashSet<TypeId>)
where
    F: Fn(TypeId) -> Option<MixinEdges>,
{
    if !placed.insert(module) {
        return;
    }
    let module_edges = edges(module).unwrap_or_default();
    place_with_mixins(module, &module_edges, edges, mro, placed);
}
