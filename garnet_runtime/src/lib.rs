//! Object model for the Garnet runtime.
//!
//! This crate provides:
//! - Interned method names (`Symbol`)
//! - Type identities, kinds and flags
//! - Per-type method tables with define/alias/remove/undef/visibility edits
//! - Hierarchy graph with superclass, include and prepend edges
//! - Ancestor linearization (MRO) and method resolution, including `super`
//! - Generation-based invalidation for caches built on top of resolution

pub mod error;
pub mod object;

// Re-export commonly used items
pub use error::{RuntimeError, RuntimeResult};
pub use object::generation::InvalidationTracker;
pub use object::method::{Callable, MethodBody, MethodEntry, MethodTable, Visibility};
pub use object::mro::{MixinEdges, Mro, compute_mro};
pub use object::registry::{TypeRecord, TypeRegistry, global_registry};
pub use object::resolver::{Lookup, LookupError, Resolved};
pub use object::symbol::{Symbol, intern};
pub use object::type_obj::{TypeFlags, TypeId, TypeKind};
