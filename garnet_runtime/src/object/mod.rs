//! Object model: type identities, method tables and the hierarchy graph.
//!
//! The registry owns every type. Edits to tables or edges go through it,
//! which serializes them and advances generations; reads go straight to
//! the per-type records.

pub mod definitions;
pub mod generation;
pub mod hierarchy;
pub mod method;
pub mod mro;
pub mod registry;
pub mod resolver;
pub mod symbol;
pub mod type_obj;
