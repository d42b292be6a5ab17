//! Violation records produced by the checker.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wd_borrow::{BorrowKind, LoanId};
use wd_intern::Interner;
use wd_place::Place;

/// What went wrong at an operation.
///
/// This is a closed set: reporters are expected to match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Binding a path that is already declared and live.
    #[error("path is already declared")]
    DuplicatePath,

    /// Accessing a path after it, or a path overlapping it, was moved out or
    /// dropped.
    #[error("use of moved value")]
    UseAfterMove,

    /// Reading a path that may not be read.
    #[error("missing read permission")]
    MissingReadPermission,

    /// Writing a path that may not be written, either because it is not
    /// mutable or because a live loan took the permission away.
    #[error("missing write permission")]
    MissingWritePermission,

    /// Moving or dropping a path that does not currently own its value.
    #[error("missing own permission")]
    MissingOwnPermission,

    /// Borrowing or reading a path that an incompatible live loan covers.
    #[error("conflicting borrow")]
    ConflictingBorrow,

    /// A loan would stay live after what it borrows from is gone.
    #[error("loan outlives its source")]
    LoanOutlivesSource,

    /// Dropping a path that does not own its value. Stops checking.
    #[error("drop of non-owning path")]
    InvalidDrop,

    /// Naming a variable that was never declared, or a subslice that no
    /// split introduced.
    #[error("unknown path")]
    UnknownPath,

    /// Closing a scope that is not the innermost open one, or opening one
    /// that is already open.
    #[error("unbalanced scope")]
    UnbalancedScope,

    /// A loan region that does not cover its borrow or names a scope that is
    /// not open.
    #[error("invalid loan region")]
    InvalidRegion,
}

impl ViolationKind {
    /// Returns `true` if the violation stops checking regardless of mode.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidDrop)
    }
}

/// The live loan implicated in a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanInfo {
    /// Loan id
    pub id: LoanId,
    /// The borrowed path
    pub source: Place,
    /// Shared or exclusive
    pub kind: BorrowKind,
    /// The path holding the reference
    pub holder: Place,
    /// Index of the operation that created the loan
    pub created_at: usize,
}

/// A rejected operation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} at operation {operation_index}")]
pub struct Violation {
    /// What went wrong
    pub kind: ViolationKind,
    /// The path the operation was about; `None` for scope operations
    pub place: Option<Place>,
    /// The live loan that caused it, if any
    pub conflicting_loan: Option<LoanInfo>,
    /// Position of the operation in the stream
    pub operation_index: usize,
}

impl Violation {
    /// Returns a detailed message explaining the violation.
    #[must_use]
    pub fn message(&self, interner: &Interner) -> String {
        let place = self
            .place
            .as_ref()
            .map(|place| place.display(interner).to_string())
            .unwrap_or_default();
        let loan = self.conflicting_loan.as_ref().map(|loan| {
            format!(
                "{} borrow of `{}` by `{}` (operation {})",
                kind_name(loan.kind),
                loan.source.display(interner),
                loan.holder.display(interner),
                loan.created_at,
            )
        });

        let head = match self.kind {
            ViolationKind::DuplicatePath => format!("`{place}` is already declared"),
            ViolationKind::UseAfterMove => {
                format!("`{place}` has been moved out or dropped and can no longer be used")
            }
            ViolationKind::MissingReadPermission => format!("cannot read `{place}`"),
            ViolationKind::MissingWritePermission => format!("cannot write to `{place}`"),
            ViolationKind::MissingOwnPermission => {
                format!("cannot move out of or drop `{place}`")
            }
            ViolationKind::ConflictingBorrow => {
                format!("cannot access `{place}` because it is already borrowed")
            }
            ViolationKind::LoanOutlivesSource => {
                format!("borrow involving `{place}` outlives what it borrows from")
            }
            ViolationKind::InvalidDrop => {
                format!("cannot drop `{place}` because it does not own its value")
            }
            ViolationKind::UnknownPath => format!("`{place}` is not declared"),
            ViolationKind::UnbalancedScope => "scope is not the innermost open scope".to_string(),
            ViolationKind::InvalidRegion => {
                format!("borrow of `{place}` has a region that does not cover it")
            }
        };

        match loan {
            Some(loan) => format!("{head}: {loan}"),
            None => head,
        }
    }
}

fn kind_name(kind: BorrowKind) -> &'static str {
    match kind {
        BorrowKind::Shared => "shared",
        BorrowKind::Exclusive => "exclusive",
    }
}
