//! Errors raised by the permission store and the loan table.

use thiserror::Error;

use crate::loans::LoanId;

/// Result type for permission store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for loan table operations.
pub type LoanResult<T> = Result<T, LoanError>;

/// Errors from [`PermissionStore`](crate::PermissionStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The root variable was never declared.
    #[error("path is not declared")]
    UnknownPath,

    /// The path is declared and still live.
    #[error("path is already declared")]
    DuplicatePath,

    /// The path, or a path containing it, was moved out or dropped.
    #[error("path has been moved out or dropped")]
    UseAfterMove,

    /// Re-initialising part of a variable that was not declared mutable.
    #[error("path is not declared mutable")]
    NotMutable,
}

/// Errors from [`LoanTable`](crate::LoanTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoanError {
    /// An incompatible live loan already covers a conflicting path.
    ///
    /// Shared + Shared is the only compatible combination.
    #[error("conflicts with live loan {existing}")]
    ConflictingBorrow {
        /// The live loan in the way
        existing: LoanId,
    },

    /// A reborrow would stay live after the loan it was derived from.
    #[error("reborrow outlives loan {parent}")]
    OutlivesSource {
        /// The loan the reborrow goes through
        parent: LoanId,
    },
}
