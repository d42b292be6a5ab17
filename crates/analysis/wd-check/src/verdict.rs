//! Per-operation outcomes.

use serde::{Deserialize, Serialize};

use crate::error::Violation;

/// Outcome of checking one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// The operation was checked and accepted.
    Ok,
    /// Checking had already stopped; the operation was not looked at.
    Unchecked,
    /// The operation was rejected.
    Violation(Violation),
}

impl Verdict {
    /// Returns `true` unless the operation was rejected.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Violation(_))
    }

    /// The violation, if the operation was rejected.
    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Violation(violation) => Some(violation),
            Self::Ok | Self::Unchecked => None,
        }
    }
}

impl From<Result<(), Violation>> for Verdict {
    fn from(result: Result<(), Violation>) -> Self {
        match result {
            Ok(()) => Self::Ok,
            Err(violation) => Self::Violation(violation),
        }
    }
}
