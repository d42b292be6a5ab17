//! Lexical scopes and loan regions.

use serde::{Deserialize, Serialize};

/// Identifier of a lexical scope, chosen by the front end.
///
/// [`ScopeId::ROOT`] is the implicit outermost scope and is always open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    /// The implicit outermost scope.
    pub const ROOT: Self = Self(0);
}

/// The stretch of the operation stream during which a loan is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Operation indices `start..=end`; the loan ends after operation `end`,
    /// typically the last use of the holder.
    Span {
        /// Index of the borrowing operation; any other value is rejected.
        start: usize,
        /// Index of the last operation the loan is live for.
        end: usize,
    },
    /// Live until the closing operation of the scope.
    Scope(ScopeId),
}

impl Region {
    /// Shorthand for [`Region::Span`].
    #[must_use]
    pub const fn span(start: usize, end: usize) -> Self {
        Self::Span { start, end }
    }

    /// The scope this region is tied to, if any.
    #[must_use]
    pub const fn scope(&self) -> Option<ScopeId> {
        match self {
            Self::Scope(scope) => Some(*scope),
            Self::Span { .. } => None,
        }
    }
}
