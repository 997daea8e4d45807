//! Call-site caching and method dispatch for the Garnet runtime.
//!
//! This crate provides:
//! - Per-call-site inline caches (monomorphic → polymorphic → megamorphic)
//! - A shared, generation-validated method cache
//! - The `Dispatcher` hot path for plain and `super` calls
//! - Dispatch configuration and statistics

pub mod config;
pub mod dispatch;
pub mod inline_cache;
pub mod method_cache;
pub mod stats;

// Re-export commonly used items
pub use config::{ConfigError, DEFAULT_METHOD_CACHE_LIMIT, DispatchConfig, MAX_POLY_CAPACITY};
pub use dispatch::{CallType, DispatchError, DispatchResult, Dispatcher};
pub use inline_cache::{CallKind, CallSite, SiteStateKind};
pub use method_cache::MethodCache;
pub use stats::{DispatchStats, StatsSnapshot};
