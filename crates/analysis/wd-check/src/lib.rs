//! The Warden checker engine.
//!
//! Consumes a linear stream of [`Operation`]s, one per program point, and
//! decides for each one whether it is permitted under the aliasing and
//! permission rules. The checker never sees source text: a front end lowers
//! its program into operations and hands the resulting [`Violation`]s to a
//! [`DiagnosticSink`] for rendering.
//!
//! # Architecture
//!
//! - [`CheckerEngine`]: owns the per-run state and checks operations in order
//! - [`CheckerConfig`]: failure mode and reborrow nesting, loadable from TOML
//! - [`Verdict`]: the outcome of one operation
//! - [`Violation`]: a structured record of a rejected operation
//!
//! # Modes
//!
//! In [`CheckMode::FailFast`] the first violation stops checking and every
//! later operation is [`Verdict::Unchecked`]. In [`CheckMode::CollectAll`]
//! a rejected operation is skipped and checking continues, except after an
//! [`ViolationKind::InvalidDrop`], which always stops.

mod checker;
mod config;
mod error;
mod operation;
mod reporter;
mod verdict;

pub use checker::{CheckerEngine, check, check_with_config, check_with_sink};
pub use config::{CheckMode, CheckerConfig, ConfigError};
pub use error::{LoanInfo, Violation, ViolationKind};
pub use operation::{Init, Operation};
pub use reporter::DiagnosticSink;
pub use verdict::Verdict;

pub use wd_borrow::{BorrowKind, LoanId, PermSet, ReborrowNesting, Region, ScopeId, TypeFacts};
