//! Errors raised by structural and method-table mutations.

use crate::object::symbol::Symbol;
use crate::object::type_obj::TypeId;
use std::fmt;

/// Rejected mutation or query against the type registry.
///
/// A failing mutation leaves the registry untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No type with this id exists.
    UnknownType(TypeId),
    /// The edge would make `ty` its own ancestor.
    CyclicHierarchy { ty: TypeId, other: TypeId },
    /// Only modules can be included or prepended.
    NotAModule(TypeId),
    /// Only classes take part in superclass edges.
    NotAClass(TypeId),
    /// The type was frozen.
    Frozen(TypeId),
    /// The method name does not resolve (alias, undef, visibility change)
    /// or is not defined directly in the type (remove).
    NameError { ty: TypeId, name: Symbol },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::UnknownType(ty) => write!(f, "unknown type {}", ty),
            RuntimeError::CyclicHierarchy { ty, other } => {
                write!(f, "cyclic hierarchy: {} is already an ancestor of {}", ty, other)
            }
            RuntimeError::NotAModule(ty) => write!(f, "wrong argument type {} (expected Module)", ty),
            RuntimeError::NotAClass(ty) => write!(f, "{} is not a class", ty),
            RuntimeError::Frozen(ty) => write!(f, "can't modify frozen type {}", ty),
            RuntimeError::NameError { ty, name } => {
                write!(f, "undefined method '{}' for {}", name, ty)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Result type for registry operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
