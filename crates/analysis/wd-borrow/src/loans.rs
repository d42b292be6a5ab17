//! Loan tracking.

use std::fmt;

use serde::{Deserialize, Serialize};
use wd_place::{Place, PlaceId, PlaceTable, conflicts, is_prefix};

use crate::{
    error::{LoanError, LoanResult},
    perms::PermSet,
    region::{Region, ScopeId},
};

/// Identifier of a loan, unique within one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoanId(pub u32);

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Kind of borrow operation.
///
/// This determines what access the holder gets and what the borrowed path
/// loses while the loan is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorrowKind {
    /// Shared borrow (`&T`).
    ///
    /// Any number of shared loans can coexist. The source can still be read
    /// but not written or moved.
    Shared,

    /// Exclusive borrow (`&mut T`).
    ///
    /// Only one exclusive loan can exist at a time. The source cannot be
    /// accessed at all while it is live.
    Exclusive,
}

impl BorrowKind {
    /// Returns `true` if this is a shared borrow.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared)
    }

    /// Permissions taken from the source and every conflicting path.
    #[must_use]
    pub fn suspends(&self) -> PermSet {
        match self {
            Self::Shared => PermSet::WRITE_OWN,
            Self::Exclusive => PermSet::ALL,
        }
    }

    /// Permissions handed to the holder. Never includes Own.
    #[must_use]
    pub fn grants(&self) -> PermSet {
        match self {
            Self::Shared => PermSet::READ,
            Self::Exclusive => PermSet::READ_WRITE,
        }
    }

    /// Permissions the source must have for the borrow to be taken.
    #[must_use]
    pub fn requires(&self) -> PermSet {
        self.grants()
    }

    /// Returns `true` if two live loans of these kinds may cover conflicting
    /// paths at the same time.
    #[must_use]
    pub fn compatible_with(&self, other: Self) -> bool {
        self.is_shared() && other.is_shared()
    }
}

/// How strictly a reborrow must nest inside the loan it goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReborrowNesting {
    /// The reborrow must end before its parent loan does.
    #[default]
    Strict,
    /// The reborrow may end at the same point as its parent loan.
    AllowEqual,
}

impl ReborrowNesting {
    /// Returns `true` if a reborrow ending at `child_end` fits inside a loan
    /// ending at `parent_end`.
    #[must_use]
    pub fn nests(self, child_end: usize, parent_end: usize) -> bool {
        match self {
            Self::Strict => child_end < parent_end,
            Self::AllowEqual => child_end <= parent_end,
        }
    }
}

/// A loan represents an active borrow.
///
/// Loans are created by a borrow operation and destroyed exactly once, when
/// their region ends or they are released explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    /// Unique id
    pub id: LoanId,
    /// The path being borrowed
    pub source: PlaceId,
    /// The kind of borrow
    pub kind: BorrowKind,
    /// The path holding the reference
    pub holder: PlaceId,
    /// The region this loan is live for
    pub region: Region,
    /// Index of the last operation the loan is live for
    pub end: usize,
    /// Index of the operation that created the loan
    pub created_at: usize,
}

/// Everything needed to take out a new loan.
#[derive(Debug, Clone, Copy)]
pub struct LoanRequest {
    /// The path being borrowed
    pub source: PlaceId,
    /// The kind of borrow
    pub kind: BorrowKind,
    /// The path that will hold the reference
    pub holder: PlaceId,
    /// The region requested by the front end
    pub region: Region,
    /// `region` resolved to the index of its last operation
    pub end: usize,
    /// Index of the borrowing operation
    pub at: usize,
}

#[derive(Debug, Clone)]
struct SplitRecord {
    array: PlaceId,
    boundary: u64,
    scope: ScopeId,
}

/// Live loans plus the splits that refine index tracking.
///
/// Loans are kept in creation order. Nothing here stores permissions:
/// whatever a loan suspends is recomputed from the live set on every query,
/// so releasing one of several overlapping loans leaves the others in force.
#[derive(Debug, Clone, Default)]
pub struct LoanTable {
    loans: Vec<Loan>,
    next_id: u32,
    splits: Vec<SplitRecord>,
}

impl LoanTable {
    /// Creates an empty loan table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wd_borrow::LoanTable;
    ///
    /// let loans = LoanTable::new();
    /// assert!(loans.is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first live loan that is incompatible with borrowing
    /// `source` as `kind`, or `None` if the borrow may proceed.
    ///
    /// # Conflict Rules
    ///
    /// - Shared + Shared = OK
    /// - Shared + Exclusive = Conflict
    /// - Exclusive + Shared = Conflict
    /// - Exclusive + Exclusive = Conflict
    #[must_use]
    pub fn check_loan(&self, places: &PlaceTable, source: &Place, kind: BorrowKind) -> Option<&Loan> {
        self.conflicting(places, source)
            .find(|existing| !existing.kind.compatible_with(kind))
    }

    /// Takes out a new loan.
    ///
    /// When the source is reached through the holder of another live loan
    /// (a reborrow), the new loan must nest inside that loan according to
    /// `nesting`.
    ///
    /// # Errors
    ///
    /// - [`LoanError::ConflictingBorrow`] if an incompatible loan is live on a
    ///   conflicting path
    /// - [`LoanError::OutlivesSource`] if a reborrow would outlive its parent
    pub fn borrow(
        &mut self,
        places: &PlaceTable,
        request: LoanRequest,
        nesting: ReborrowNesting,
    ) -> LoanResult<LoanId> {
        let source = places.lookup(request.source);

        if let Some(existing) = self.check_loan(places, source, request.kind) {
            return Err(LoanError::ConflictingBorrow {
                existing: existing.id,
            });
        }

        if let Some(parent) = self
            .parents(places, source)
            .find(|parent| !nesting.nests(request.end, parent.end))
        {
            return Err(LoanError::OutlivesSource { parent: parent.id });
        }

        let id = LoanId(self.next_id);
        self.next_id += 1;
        self.loans.push(Loan {
            id,
            source: request.source,
            kind: request.kind,
            holder: request.holder,
            region: request.region,
            end: request.end,
            created_at: request.at,
        });
        tracing::debug!(loan = %id, kind = ?request.kind, end = request.end, "loan created");

        Ok(id)
    }

    /// Removes a loan, returning it if it was live.
    pub fn release(&mut self, id: LoanId) -> Option<Loan> {
        let idx = self.loans.iter().position(|loan| loan.id == id)?;
        let loan = self.loans.remove(idx);
        tracing::debug!(loan = %id, "loan released");
        Some(loan)
    }

    /// Releases every span loan whose last operation comes before `at`.
    pub fn expire(&mut self, at: usize) -> Vec<Loan> {
        self.release_where(|loan| matches!(loan.region, Region::Span { .. }) && loan.end < at)
    }

    /// Releases every loan whose region is `scope`, most recent first.
    pub fn release_region(&mut self, scope: ScopeId) -> Vec<Loan> {
        self.release_where(|loan| loan.region == Region::Scope(scope))
    }

    /// Releases every loan held by `holder` or a path inside it, most recent
    /// first.
    pub fn release_held_by(&mut self, places: &PlaceTable, holder: &Place) -> Vec<Loan> {
        let held: Vec<_> = self
            .loans
            .iter()
            .filter(|loan| is_prefix(holder, places.lookup(loan.holder)))
            .map(|loan| loan.id)
            .collect();
        self.release_where(|loan| held.contains(&loan.id))
    }

    /// Re-homes every loan held by `from` onto `to`, as when a reference is
    /// moved into a new binding. Returns the number of loans moved.
    pub fn transfer(&mut self, from: PlaceId, to: PlaceId) -> usize {
        let mut moved = 0;
        for loan in self.loans.iter_mut().filter(|loan| loan.holder == from) {
            loan.holder = to;
            moved += 1;
        }
        moved
    }

    /// Live loans whose source may alias `place`.
    pub fn conflicting<'a, 'p>(
        &'a self,
        places: &'p PlaceTable,
        place: &'p Place,
    ) -> impl Iterator<Item = &'a Loan> {
        self.loans
            .iter()
            .filter(move |loan| conflicts(places.lookup(loan.source), place))
    }

    /// Union of everything the live loans take away from `place`.
    #[must_use]
    pub fn suspended(&self, places: &PlaceTable, place: &Place) -> PermSet {
        self.conflicting(places, place)
            .fold(PermSet::EMPTY, |acc, loan| acc | loan.kind.suspends())
    }

    /// The most recently created live loan that takes away any of `needed`
    /// from `place`.
    #[must_use]
    pub fn blocking(&self, places: &PlaceTable, place: &Place, needed: PermSet) -> Option<&Loan> {
        self.conflicting(places, place)
            .filter(|loan| !loan.kind.suspends().intersection(needed).is_empty())
            .last()
    }

    /// Live loans whose holder `place` is reached through.
    pub fn parents<'a, 'p>(
        &'a self,
        places: &'p PlaceTable,
        place: &'p Place,
    ) -> impl Iterator<Item = &'a Loan> {
        self.loans
            .iter()
            .filter(move |loan| is_prefix(places.lookup(loan.holder), place))
    }

    /// Looks up a live loan.
    #[must_use]
    pub fn get(&self, id: LoanId) -> Option<&Loan> {
        self.loans.iter().find(|loan| loan.id == id)
    }

    /// All live loans in creation order.
    #[must_use]
    pub fn loans(&self) -> &[Loan] {
        &self.loans
    }

    /// Number of live loans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loans.len()
    }

    /// Returns `true` if no loan is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// Registers a split of `array` at `boundary` for the rest of `scope` and
    /// returns the two halves.
    ///
    /// Splitting the same array at the same boundary again is a no-op.
    pub fn split(
        &mut self,
        places: &mut PlaceTable,
        array: &Place,
        boundary: u64,
        scope: ScopeId,
    ) -> (PlaceId, PlaceId) {
        let array_id = places.intern(array);
        let (left, right) = array.split_halves(boundary);
        let already = self
            .splits
            .iter()
            .any(|split| split.array == array_id && split.boundary == boundary);
        if !already {
            self.splits.push(SplitRecord {
                array: array_id,
                boundary,
                scope,
            });
            tracing::debug!(boundary, "array split registered");
        }
        (places.intern(&left), places.intern(&right))
    }

    /// Returns `true` if a live split of `array` produced the range
    /// `[from, to)`.
    #[must_use]
    pub fn is_split(&self, places: &PlaceTable, array: &Place, from: u64, to: Option<u64>) -> bool {
        let Some(array_id) = places.get(array) else {
            return false;
        };
        self.splits.iter().any(|split| {
            split.array == array_id
                && ((from == 0 && to == Some(split.boundary))
                    || (from == split.boundary && to.is_none()))
        })
    }

    /// Drops the splits registered in `scope`.
    pub fn discard_splits(&mut self, scope: ScopeId) {
        self.splits.retain(|split| split.scope != scope);
    }

    fn release_where(&mut self, mut pred: impl FnMut(&Loan) -> bool) -> Vec<Loan> {
        let mut released = Vec::new();
        let mut idx = self.loans.len();
        while idx > 0 {
            idx -= 1;
            if pred(&self.loans[idx]) {
                let loan = self.loans.remove(idx);
                tracing::debug!(loan = %loan.id, "loan released");
                released.push(loan);
            }
        }
        released
    }
}
