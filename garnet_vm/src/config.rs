//! Dispatch configuration.
//!
//! Defaults suit typical object-oriented programs: call sites tolerate two
//! receiver types before giving up on per-site caching.

/// Largest polymorphic cache a call site may hold.
pub const MAX_POLY_CAPACITY: usize = 8;

/// Configuration for the dispatcher and its call sites.
///
/// # Example
///
/// ```ignore
/// use garnet_vm::DispatchConfig;
///
/// // Tolerate more receiver types per site before going megamorphic
/// let config = DispatchConfig {
///     poly_capacity: 4,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Receiver types a call site caches before turning megamorphic.
    ///
    /// A capacity of 1 sends a site straight from monomorphic to
    /// megamorphic on the second receiver type.
    ///
    /// Default: 2
    pub poly_capacity: usize,

    /// Consult the shared method cache on every call-site miss before
    /// running a full resolution.
    ///
    /// Default: true
    pub method_cache: bool,

    /// Consult the shared method cache from megamorphic sites. Ignored
    /// when `method_cache` is on.
    ///
    /// Default: true
    pub megamorphic_method_cache: bool,

    /// Entries the shared method cache may hold before stale ones are
    /// swept out. If a sweep leaves it still over the limit, it is cleared.
    ///
    /// Default: 65536
    pub method_cache_limit: usize,
}

/// Default for [`DispatchConfig::method_cache_limit`].
pub const DEFAULT_METHOD_CACHE_LIMIT: usize = 1 << 16;

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poly_capacity: 2,
            method_cache: true,
            megamorphic_method_cache: true,
            method_cache_limit: DEFAULT_METHOD_CACHE_LIMIT,
        }
    }
}

impl DispatchConfig {
    /// Sites never go polymorphic and the shared cache is off. Every miss
    /// runs the resolver, which makes resolution counts easy to reason about.
    pub fn uncached_misses() -> Self {
        Self {
            poly_capacity: 1,
            method_cache: false,
            megamorphic_method_cache: false,
            method_cache_limit: DEFAULT_METHOD_CACHE_LIMIT,
        }
    }

    pub fn with_poly_capacity(mut self, capacity: usize) -> Self {
        self.poly_capacity = capacity;
        self
    }

    pub fn with_method_cache(mut self, enabled: bool) -> Self {
        self.method_cache = enabled;
        self
    }

    pub fn with_megamorphic_method_cache(mut self, enabled: bool) -> Self {
        self.megamorphic_method_cache = enabled;
        self
    }

    pub fn with_method_cache_limit(mut self, limit: usize) -> Self {
        self.method_cache_limit = limit;
        self
    }

    /// The shared cache is consulted for this kind of lookup.
    #[inline]
    pub fn uses_method_cache(&self, megamorphic: bool) -> bool {
        self.method_cache || (megamorphic && self.megamorphic_method_cache)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poly_capacity == 0 || self.poly_capacity > MAX_POLY_CAPACITY {
            return Err(ConfigError::PolyCapacityOutOfRange(self.poly_capacity));
        }
        if self.method_cache_limit == 0 {
            return Err(ConfigError::ZeroMethodCacheLimit);
        }
        Ok(())
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    PolyCapacityOutOfRange(usize),
    ZeroMethodCacheLimit,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::PolyCapacityOutOfRange(capacity) => write!(
                f,
                "polymorphic capacity {} outside 1..={}",
                capacity, MAX_POLY_CAPACITY
            ),
            ConfigError::ZeroMethodCacheLimit => write!(f, "method cache limit must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}
