//! The operation vocabulary a front end feeds the checker.

use serde::{Deserialize, Serialize};
use wd_borrow::{BorrowKind, PermSet, Region, ScopeId, TypeFacts};
use wd_place::Place;

/// Where the value of a new binding comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Init {
    /// A freshly constructed value (literal, constructor call, ...).
    Fresh,
    /// The value is moved out of another path.
    Move(Place),
    /// The value is copied out of another path. Degrades to a move when the
    /// source is not trivially duplicable.
    Copy(Place),
}

/// One step of the analysed program, in program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Opens a nested lexical scope.
    ScopeBegin(ScopeId),
    /// Closes the innermost scope: releases its loans and drops its paths.
    ScopeEnd(ScopeId),
    /// Declares `place` in the current scope.
    Bind {
        /// The new path
        place: Place,
        /// Where its value comes from
        init: Init,
        /// Whether the binding is mutable
        mutable: bool,
        /// Permissions requested for the binding
        perms: PermSet,
        /// Type facts of the bound value
        facts: TypeFacts,
    },
    /// Names a projected path and records its type facts.
    Project {
        /// The projected path
        place: Place,
        /// Type facts of the value at that path
        facts: TypeFacts,
    },
    /// Consumes the value at a path, e.g. passing it by value.
    Move(Place),
    /// Duplicates the value at a path.
    Copy(Place),
    /// Creates a reference to `source` stored in `holder`.
    Borrow {
        /// The borrowed path
        source: Place,
        /// Shared or exclusive
        kind: BorrowKind,
        /// The path receiving the reference
        holder: Place,
        /// How long the loan stays live
        region: Region,
    },
    /// Writes to a path.
    Mutate(Place),
    /// Accesses a path with the given permissions.
    Use {
        /// The accessed path
        place: Place,
        /// Permissions the access needs
        needs: PermSet,
    },
    /// Drops the value at an owning path.
    Drop(Place),
    /// Ends every loan held by a path.
    Release(Place),
    /// Splits an array into two disjoint halves at `boundary`.
    Split {
        /// The array being split
        array: Place,
        /// First element of the right half
        boundary: u64,
    },
    /// Marks an explicitly unchecked access; never rejected.
    Unchecked(Place),
}

impl Operation {
    /// `let place = <fresh value>;` owning, immutable, all permissions.
    #[must_use]
    pub fn bind(place: Place) -> Self {
        Self::Bind {
            place,
            init: Init::Fresh,
            mutable: false,
            perms: PermSet::ALL,
            facts: TypeFacts::OWNED,
        }
    }

    /// `let mut place = <fresh value>;` owning, all permissions.
    #[must_use]
    pub fn bind_mut(place: Place) -> Self {
        Self::Bind {
            place,
            init: Init::Fresh,
            mutable: true,
            perms: PermSet::ALL,
            facts: TypeFacts::OWNED,
        }
    }

    /// `let place = <fresh value>;` with explicit type facts.
    #[must_use]
    pub fn bind_with(place: Place, mutable: bool, facts: TypeFacts) -> Self {
        Self::Bind {
            place,
            init: Init::Fresh,
            mutable,
            perms: PermSet::ALL,
            facts,
        }
    }

    /// `let place = source;` moving an owned value.
    #[must_use]
    pub fn bind_move(place: Place, source: Place) -> Self {
        Self::Bind {
            place,
            init: Init::Move(source),
            mutable: false,
            perms: PermSet::ALL,
            facts: TypeFacts::OWNED,
        }
    }

    /// `let place = source;` copying a trivially duplicable value.
    #[must_use]
    pub fn bind_copy(place: Place, source: Place) -> Self {
        Self::Bind {
            place,
            init: Init::Copy(source),
            mutable: false,
            perms: PermSet::ALL,
            facts: TypeFacts::COPY,
        }
    }

    /// `holder = &source` live for `region`.
    #[must_use]
    pub fn borrow(source: Place, holder: Place, region: Region) -> Self {
        Self::Borrow {
            source,
            kind: BorrowKind::Shared,
            holder,
            region,
        }
    }

    /// `holder = &mut source` live for `region`.
    #[must_use]
    pub fn borrow_mut(source: Place, holder: Place, region: Region) -> Self {
        Self::Borrow {
            source,
            kind: BorrowKind::Exclusive,
            holder,
            region,
        }
    }

    /// A read of `place`.
    #[must_use]
    pub fn read(place: Place) -> Self {
        Self::Use {
            place,
            needs: PermSet::READ,
        }
    }

    /// The path this operation is primarily about, if it names one.
    #[must_use]
    pub fn place(&self) -> Option<&Place> {
        match self {
            Self::ScopeBegin(_) | Self::ScopeEnd(_) => None,
            Self::Bind { place, .. }
            | Self::Project { place, .. }
            | Self::Use { place, .. }
            | Self::Move(place)
            | Self::Copy(place)
            | Self::Mutate(place)
            | Self::Drop(place)
            | Self::Release(place)
            | Self::Unchecked(place) => Some(place),
            Self::Borrow { source, .. } => Some(source),
            Self::Split { array, .. } => Some(array),
        }
    }
}
