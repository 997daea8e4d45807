//! Interned method names.
//!
//! Method tables, call sites and caches key on `Symbol` rather than on
//! strings so that equality and hashing are a single `u32` compare.
//! The interner is process-global and never frees; method names are a
//! small, bounded set in any real program.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::OnceLock;

/// Interned identifier for a method name.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// Raw interner index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The interned text.
    pub fn as_str(self) -> &'static str {
        interner().read().names[self.0 as usize]
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Interner {
    lookup: FxHashMap<&'static str, Symbol>,
    names: Vec<&'static str>,
}

static INTERNER: OnceLock<RwLock<Interner>> = OnceLock::new();

fn interner() -> &'static RwLock<Interner> {
    INTERNER.get_or_init(|| RwLock::new(Interner::default()))
}

/// Intern a method name.
pub fn intern(name: &str) -> Symbol {
    if let Some(&symbol) = interner().read().lookup.get(name) {
        return symbol;
    }

    let mut table = interner().write();
    // Another thread may have won the race between the two locks.
    if let Some(&symbol) = table.lookup.get(name) {
        return symbol;
    }
    let text: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let symbol = Symbol(table.names.len() as u32);
    table.names.push(text);
    table.lookup.insert(text, symbol);
    symbol
}
