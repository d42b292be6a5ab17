//! Read/Write/Own permission sets.

use std::fmt;
use std::ops::{BitOr, Sub};

use serde::{Deserialize, Serialize};

/// A subset of {Read, Write, Own}.
///
/// - `R`: the path may be read (or shared-borrowed)
/// - `W`: the path may be written (or exclusively borrowed)
/// - `O`: the path owns its value and may be moved or dropped
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PermSet(u8);

impl PermSet {
    /// No permissions.
    pub const EMPTY: Self = Self(0);
    /// Read.
    pub const READ: Self = Self(0b001);
    /// Write.
    pub const WRITE: Self = Self(0b010);
    /// Own.
    pub const OWN: Self = Self(0b100);
    /// Read and write, what an exclusive loan hands to its holder.
    pub const READ_WRITE: Self = Self(0b011);
    /// Write and own, what a shared loan takes away from its source.
    pub const WRITE_OWN: Self = Self(0b110);
    /// Everything.
    pub const ALL: Self = Self(0b111);

    /// Returns `true` if every permission in `other` is also in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no permission is present.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Permissions present in either set.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Permissions present in both sets.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Permissions in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Permissions in `needed` that `self` lacks.
    #[must_use]
    pub const fn missing(self, needed: Self) -> Self {
        needed.difference(self)
    }
}

impl BitOr for PermSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl Sub for PermSet {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.difference(rhs)
    }
}

impl fmt::Display for PermSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        for (perm, letter) in [(Self::READ, 'R'), (Self::WRITE, 'W'), (Self::OWN, 'O')] {
            if self.contains(perm) {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PermSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermSet({self})")
    }
}
