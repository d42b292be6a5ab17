//! Permission bookkeeping for the Warden borrow checker.
//!
//! This crate holds the two pieces of state the checker engine consults on
//! every operation:
//!
//! - [`PermissionStore`]: declared Read/Write/Own permissions per path and
//!   which paths have been retired by a move or drop
//! - [`LoanTable`]: live borrows, their regions, and the array splits that
//!   refine index tracking
//!
//! Permissions are never cached. [`PermissionStore::get`] recomputes a
//! path's set from its declaration minus everything the live loans on
//! conflicting paths suspend, so overlapping and nested loans release
//! correctly in any order.
//!
//! # Borrow Rules
//!
//! 1. Any number of shared loans, or exactly one exclusive loan, may be live
//!    on conflicting paths
//! 2. A shared loan takes Write and Own from its source; an exclusive loan
//!    takes everything
//! 3. A reborrow must nest inside the loan it goes through

mod error;
mod loans;
mod perms;
mod region;
mod store;

pub use error::{LoanError, LoanResult, StoreError, StoreResult};
pub use loans::{BorrowKind, Loan, LoanId, LoanRequest, LoanTable, ReborrowNesting};
pub use perms::PermSet;
pub use region::{Region, ScopeId};
pub use store::{DeclareRequest, Declaration, PermissionStore, TypeFacts};
