//! Symbol interning for variable and field names.
//!
//! The checker compares paths structurally, so every root name and field
//! name is interned once and carried around as a [`Symbol`].

pub use lasso::Spur as Symbol;
use lasso::ThreadedRodeo;
use std::sync::Arc;

/// Shared string interner.
///
/// Cloning is cheap and every clone resolves the same symbols, so a front end
/// can hand one copy to the checker and keep another for rendering.
#[derive(Clone, Debug)]
pub struct Interner {
    inner: Arc<ThreadedRodeo>,
}

impl Interner {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ThreadedRodeo::new()),
        }
    }

    /// Interns `s`, returning the existing symbol if it was seen before.
    pub fn intern(&self, s: &str) -> Symbol {
        self.inner.get_or_intern(s)
    }

    /// Returns the symbol for `s` without interning it.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.inner.get(s)
    }

    /// Resolves a symbol produced by this interner.
    ///
    /// Symbols from a different interner resolve to `"<unknown>"` instead of
    /// panicking.
    #[must_use]
    pub fn resolve(&self, sym: &Symbol) -> String {
        self.try_resolve(sym)
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// Resolves a symbol, or `None` if it was not produced by this interner.
    #[must_use]
    pub fn try_resolve(&self, sym: &Symbol) -> Option<String> {
        self.inner.try_resolve(sym).map(ToString::to_string)
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
