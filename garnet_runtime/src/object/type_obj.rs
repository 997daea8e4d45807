//! Type identities and per-type flags.

use std::fmt;

// =============================================================================
// Type Id
// =============================================================================

/// Index of a class, module or singleton class in the type arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Root of every class hierarchy.
    pub const BASIC_OBJECT: TypeId = TypeId(0);
    /// Default superclass for `define_class`.
    pub const OBJECT: TypeId = TypeId(1);
    /// Superclass of module metaclasses.
    pub const MODULE: TypeId = TypeId(2);
    /// Superclass of root metaclasses.
    pub const CLASS: TypeId = TypeId(3);

    /// First id handed out to types created after bootstrap.
    pub const FIRST_USER_TYPE: u32 = 4;

    /// Create from a raw arena index.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw arena index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    /// Check if this is one of the bootstrapped root types.
    #[inline]
    pub const fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER_TYPE
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Type Kind
// =============================================================================

/// What a type descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// A class: has at most one superclass, can be instantiated.
    Class,
    /// A module: mixed into other types with `include`/`prepend`.
    Module,
    /// A singleton class attached to one object or one class.
    Singleton,
}

impl TypeKind {
    /// Modules are the only kind that can be mixed in.
    #[inline]
    pub fn is_module(self) -> bool {
        self == TypeKind::Module
    }

    /// Classes and singleton classes take part in superclass chains.
    #[inline]
    pub fn has_superclass(self) -> bool {
        self != TypeKind::Module
    }
}

// =============================================================================
// Type Flags
// =============================================================================

bitflags::bitflags! {
    /// Mutable per-type state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        /// Bootstrapped root type.
        const BUILTIN = 1 << 0;
        /// Method table and hierarchy edges can no longer change.
        const FROZEN = 1 << 1;
        /// At least one module has been prepended.
        const HAS_PREPENDS = 1 << 2;
        /// A metaclass has been created for this type.
        const HAS_METACLASS = 1 << 3;
    }
}

impl Default for TypeFlags {
    fn default() -> Self {
        Self::empty()
    }
}
