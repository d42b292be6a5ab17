//! Main checker implementation.

use rustc_hash::FxHashMap;
use wd_borrow::{
    BorrowKind, DeclareRequest, Loan, LoanError, LoanId, LoanRequest, LoanTable, PermSet,
    PermissionStore, Region, ScopeId, StoreError, TypeFacts,
};
use wd_place::{Place, PlaceTable};

use crate::{
    config::{CheckMode, CheckerConfig},
    error::{LoanInfo, Violation, ViolationKind},
    operation::{Init, Operation},
    reporter::DiagnosticSink,
    verdict::Verdict,
};

type CheckResult<T = ()> = Result<T, Violation>;

/// Checks an operation stream, returning one verdict per operation.
///
/// Each call builds a fresh [`CheckerEngine`], so checking the same stream
/// twice yields the same verdicts.
///
/// # Examples
///
/// ```rust
/// use wd_check::{CheckMode, Operation, ViolationKind, check};
/// use wd_intern::Interner;
/// use wd_place::Place;
///
/// let interner = Interner::new();
/// let s = Place::root(interner.intern("s"));
/// let t = Place::root(interner.intern("t"));
///
/// let verdicts = check(
///     &[
///         Operation::bind(s.clone()),
///         Operation::bind_move(t, s.clone()),
///         Operation::read(s),
///     ],
///     CheckMode::CollectAll,
/// );
/// let violation = verdicts[2].violation().unwrap();
/// assert_eq!(violation.kind, ViolationKind::UseAfterMove);
/// ```
#[must_use]
pub fn check(operations: &[Operation], mode: CheckMode) -> Vec<Verdict> {
    check_with_config(operations, &CheckerConfig::new(mode))
}

/// [`check`] with full configuration.
#[must_use]
pub fn check_with_config(operations: &[Operation], config: &CheckerConfig) -> Vec<Verdict> {
    CheckerEngine::new(*config).run(operations)
}

/// [`check_with_config`], additionally handing every violation to `sink`.
pub fn check_with_sink(
    operations: &[Operation],
    config: &CheckerConfig,
    sink: &mut impl DiagnosticSink,
) -> Vec<Verdict> {
    let verdicts = check_with_config(operations, config);
    for violation in verdicts.iter().filter_map(Verdict::violation) {
        sink.report(violation);
    }
    verdicts
}

#[derive(Debug, Clone, Copy)]
struct OpenScope {
    id: ScopeId,
    /// Index of the closing operation, `usize::MAX` if it never closes.
    end: usize,
}

/// The borrow checker state for one analysis run.
///
/// The engine owns its permission store and loan table; nothing is shared
/// between runs. Operations are checked strictly in order. A rejected
/// operation has no effect on the state, except that a binding's destination
/// (a `Bind` target or a `Borrow` holder) is still declared so later
/// operations on it are checked normally.
#[derive(Debug)]
pub struct CheckerEngine {
    config: CheckerConfig,
    places: PlaceTable,
    store: PermissionStore,
    loans: LoanTable,
    scopes: Vec<OpenScope>,
    /// Index of each `ScopeBegin` mapped to the index of its `ScopeEnd`.
    scope_ends: FxHashMap<usize, usize>,
    next_index: usize,
    stopped: bool,
}

impl CheckerEngine {
    /// Creates an engine with only the root scope open.
    #[must_use]
    pub fn new(config: CheckerConfig) -> Self {
        Self {
            config,
            places: PlaceTable::new(),
            store: PermissionStore::new(),
            loans: LoanTable::new(),
            scopes: vec![OpenScope {
                id: ScopeId::ROOT,
                end: usize::MAX,
            }],
            scope_ends: FxHashMap::default(),
            next_index: 0,
            stopped: false,
        }
    }

    /// Checks a whole stream.
    ///
    /// Scope-tied regions are resolved against the closing operations found
    /// in `operations`; operations fed through [`step`](Self::step) alone
    /// treat every scope as open until the end.
    pub fn run(&mut self, operations: &[Operation]) -> Vec<Verdict> {
        self.resolve_scope_ends(operations);
        operations.iter().map(|op| self.step(op)).collect()
    }

    /// Checks the next operation.
    pub fn step(&mut self, op: &Operation) -> Verdict {
        let at = self.next_index;
        self.next_index += 1;

        if self.stopped {
            return Verdict::Unchecked;
        }

        self.loans.expire(at);
        tracing::trace!(index = at, ?op, "checking operation");

        let verdict = Verdict::from(self.apply(op, at));
        if let Some(violation) = verdict.violation() {
            tracing::debug!(index = at, kind = %violation.kind, "operation rejected");
            if self.config.mode == CheckMode::FailFast || violation.kind.is_fatal() {
                self.stopped = true;
            }
        }
        verdict
    }

    /// Current permissions of `place`, or `None` if its root is unknown.
    #[must_use]
    pub fn permissions(&self, place: &Place) -> Option<PermSet> {
        self.store.get(&self.places, &self.loans, place).ok()
    }

    /// Returns `true` if `place` is declared and nothing overlapping it has
    /// been moved out or dropped.
    #[must_use]
    pub fn is_live(&self, place: &Place) -> bool {
        self.check_live(place, self.next_index).is_ok()
    }

    /// The live loans.
    #[must_use]
    pub fn loans(&self) -> &LoanTable {
        &self.loans
    }

    /// The live loans with their paths resolved.
    #[must_use]
    pub fn live_loans(&self) -> Vec<LoanInfo> {
        self.loans
            .loans()
            .iter()
            .map(|loan| self.loan_info(loan))
            .collect()
    }

    /// Returns `true` once checking has stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// The configuration this engine runs with.
    #[must_use]
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    fn resolve_scope_ends(&mut self, operations: &[Operation]) {
        let offset = self.next_index;
        let mut open: Vec<(ScopeId, usize)> = Vec::new();
        for (idx, op) in operations.iter().enumerate() {
            match op {
                Operation::ScopeBegin(id) => open.push((*id, offset + idx)),
                Operation::ScopeEnd(id) => {
                    if let Some(&(top, begin)) = open.last() {
                        if top == *id {
                            open.pop();
                            self.scope_ends.insert(begin, offset + idx);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn apply(&mut self, op: &Operation, at: usize) -> CheckResult {
        match op {
            Operation::ScopeBegin(id) => self.begin_scope(*id, at),
            Operation::ScopeEnd(id) => self.end_scope(*id, at),
            Operation::Bind {
                place,
                init,
                mutable,
                perms,
                facts,
            } => self.bind(place, init, *mutable, *perms, *facts, at),
            Operation::Project { place, facts } => self.project(place, *facts, at),
            Operation::Move(place) => self.consume(place, at),
            Operation::Copy(place) => {
                if self.check_copy(place, at)? {
                    self.retire(place);
                }
                Ok(())
            }
            Operation::Borrow {
                source,
                kind,
                holder,
                region,
            } => self.borrow(source, *kind, holder, *region, at),
            Operation::Mutate(place) => self.access(place, PermSet::WRITE, at),
            Operation::Use { place, needs } => self.access(place, *needs, at),
            Operation::Drop(place) => self.drop_place(place, at),
            Operation::Release(holder) => self.release(holder, at),
            Operation::Split { array, boundary } => self.split(array, *boundary, at),
            Operation::Unchecked(_) => {
                tracing::warn!(index = at, "access outside of permission checking");
                Ok(())
            }
        }
    }

    fn begin_scope(&mut self, id: ScopeId, at: usize) -> CheckResult {
        if self.scopes.iter().any(|scope| scope.id == id) {
            return Err(self.violation(ViolationKind::UnbalancedScope, None, None, at));
        }
        let end = self.scope_ends.get(&at).copied().unwrap_or(usize::MAX);
        self.scopes.push(OpenScope { id, end });
        tracing::debug!(scope = id.0, "scope opened");
        Ok(())
    }

    /// Closes the innermost scope.
    ///
    /// Loans tied to the scope go first (most recent first), then loans held
    /// by anything declared in it, then its paths are dropped in reverse
    /// declaration order. A path that is still borrowed when it is dropped
    /// means the loan outlives it; that loan is released so it is reported
    /// only once.
    fn end_scope(&mut self, id: ScopeId, at: usize) -> CheckResult {
        let innermost = self.scopes.last().map(|scope| scope.id);
        if id == ScopeId::ROOT || innermost != Some(id) {
            return Err(self.violation(ViolationKind::UnbalancedScope, None, None, at));
        }

        self.loans.release_region(id);

        let dying: Vec<Place> = self
            .store
            .live_in_scope(id)
            .iter()
            .map(|decl| self.places.lookup(decl.place).clone())
            .collect();
        for place in &dying {
            self.loans.release_held_by(&self.places, place);
        }
        self.loans.discard_splits(id);

        let mut first = None;
        for place in &dying {
            let outliving: Vec<LoanId> = self
                .loans
                .conflicting(&self.places, place)
                .map(|loan| loan.id)
                .collect();
            if first.is_none() {
                if let Some(loan) = outliving.first().and_then(|id| self.loans.get(*id)) {
                    first = Some(self.violation(
                        ViolationKind::LoanOutlivesSource,
                        Some(place),
                        Some(loan),
                        at,
                    ));
                }
            }
            for loan in outliving {
                self.loans.release(loan);
            }
            self.retire(place);
        }

        self.scopes.pop();
        tracing::debug!(scope = id.0, dropped = dying.len(), "scope closed");
        first.map_or(Ok(()), Err)
    }

    fn bind(
        &mut self,
        place: &Place,
        init: &Init,
        mutable: bool,
        perms: PermSet,
        facts: TypeFacts,
        at: usize,
    ) -> CheckResult {
        let source = match init {
            Init::Fresh => Ok(None),
            Init::Move(source) => self.check_move(source, at).map(|()| Some(source)),
            Init::Copy(source) => self
                .check_copy(source, at)
                .map(|moves| moves.then_some(source)),
        };

        // A moved reference stays a reference.
        let holder = match &source {
            Ok(Some(source)) if source.is_root() => self
                .store
                .declaration(source.root)
                .and_then(|decl| decl.holder),
            _ => None,
        };
        let request = match holder {
            Some(kind) => DeclareRequest {
                perms: kind.grants(),
                mutable,
                facts: TypeFacts::reference(kind),
                scope: self.current_scope(),
                holder: Some(kind),
            },
            None => DeclareRequest {
                perms,
                mutable,
                facts,
                scope: self.current_scope(),
                holder: None,
            },
        };

        let declared = self.store.declare(&mut self.places, place, request);
        let source = source?;
        declared.map_err(|err| self.store_violation(err, place, at))?;

        if let Some(source) = source {
            if holder.is_some() {
                let from = self.places.intern(source);
                let to = self.places.intern(place);
                self.loans.transfer(from, to);
            }
            self.retire(source);
        }
        Ok(())
    }

    fn project(&mut self, place: &Place, facts: TypeFacts, at: usize) -> CheckResult {
        self.validate(place, at)?;
        if place.is_root() {
            return Ok(());
        }
        self.store
            .register_facts(&mut self.places, place, facts)
            .map_err(|err| self.store_violation(err, place, at))
    }

    fn consume(&mut self, place: &Place, at: usize) -> CheckResult {
        self.check_move(place, at)?;
        self.retire(place);
        Ok(())
    }

    /// A move needs Own (Read for non-owning values) and no live loan on
    /// anything overlapping the path, since the path is retired afterwards.
    fn check_move(&self, place: &Place, at: usize) -> CheckResult {
        let needs = if self.facts(place).is_owning {
            PermSet::OWN
        } else {
            PermSet::READ
        };
        self.access(place, needs, at)?;
        if let Some(loan) = self.loans.conflicting(&self.places, place).last() {
            return Err(self.violation(
                ViolationKind::ConflictingBorrow,
                Some(place),
                Some(loan),
                at,
            ));
        }
        Ok(())
    }

    /// Returns `true` when the copy degrades to a move.
    fn check_copy(&self, place: &Place, at: usize) -> CheckResult<bool> {
        if self.facts(place).is_trivially_duplicable {
            self.access(place, PermSet::READ, at)?;
            Ok(false)
        } else {
            self.check_move(place, at)?;
            Ok(true)
        }
    }

    fn borrow(
        &mut self,
        source: &Place,
        kind: BorrowKind,
        holder: &Place,
        region: Region,
        at: usize,
    ) -> CheckResult {
        let end = match self.check_borrow(source, kind, region, at) {
            Ok(end) => end,
            Err(violation) => {
                self.declare_holder_if_absent(holder, kind);
                return Err(violation);
            }
        };

        let request = LoanRequest {
            source: self.places.intern(source),
            kind,
            holder: self.places.intern(holder),
            region,
            end,
            at,
        };
        let id = match self
            .loans
            .borrow(&self.places, request, self.config.reborrow_nesting)
        {
            Ok(id) => id,
            Err(err) => {
                self.declare_holder_if_absent(holder, kind);
                let (violation_kind, loan) = match err {
                    LoanError::ConflictingBorrow { existing } => {
                        (ViolationKind::ConflictingBorrow, existing)
                    }
                    LoanError::OutlivesSource { parent } => {
                        (ViolationKind::LoanOutlivesSource, parent)
                    }
                };
                return Err(self.violation(
                    violation_kind,
                    Some(source),
                    self.loans.get(loan),
                    at,
                ));
            }
        };

        if let Err(violation) = self.prepare_holder(holder, kind, id, at) {
            self.loans.release(id);
            return Err(violation);
        }
        Ok(())
    }

    /// Checks everything about a borrow that does not depend on other loans
    /// nesting, returning the resolved end of its region.
    fn check_borrow(
        &self,
        source: &Place,
        kind: BorrowKind,
        region: Region,
        at: usize,
    ) -> CheckResult<usize> {
        let end = match region {
            Region::Span { start, end } if start == at && end >= at => Some(end),
            Region::Span { .. } => None,
            Region::Scope(id) => self
                .scopes
                .iter()
                .rev()
                .find(|scope| scope.id == id)
                .map(|scope| scope.end),
        };
        let Some(end) = end else {
            return Err(self.violation(ViolationKind::InvalidRegion, Some(source), None, at));
        };

        self.check_live(source, at)?;

        if let Some(existing) = self.loans.check_loan(&self.places, source, kind) {
            return Err(self.violation(
                ViolationKind::ConflictingBorrow,
                Some(source),
                Some(existing),
                at,
            ));
        }

        let missing = self.perms(source, at)?.missing(kind.requires());
        if missing.contains(PermSet::READ) {
            return Err(self.violation(ViolationKind::MissingReadPermission, Some(source), None, at));
        }
        if missing.contains(PermSet::WRITE) {
            return Err(self.violation(ViolationKind::MissingWritePermission, Some(source), None, at));
        }
        Ok(end)
    }

    /// Makes `holder` ready to receive the reference created by loan `new`.
    ///
    /// Storing into the holder overwrites it, so nothing else may borrow it.
    fn prepare_holder(
        &mut self,
        holder: &Place,
        kind: BorrowKind,
        new: LoanId,
        at: usize,
    ) -> CheckResult {
        if let Some(loan) = self
            .loans
            .conflicting(&self.places, holder)
            .filter(|loan| loan.id != new)
            .last()
        {
            return Err(self.violation(
                ViolationKind::ConflictingBorrow,
                Some(holder),
                Some(loan),
                at,
            ));
        }
        if !holder.is_root() {
            return self.access(holder, PermSet::WRITE, at);
        }
        let live = self
            .store
            .declaration(holder.root)
            .is_some_and(|decl| decl.live);
        let result = if live {
            self.store.assign_holder(holder.root, kind)
        } else {
            self.declare_holder(holder, kind)
        };
        result.map_err(|err| self.store_violation(err, holder, at))
    }

    fn declare_holder_if_absent(&mut self, holder: &Place, kind: BorrowKind) {
        let live = self
            .store
            .declaration(holder.root)
            .is_some_and(|decl| decl.live);
        if holder.is_root() && !live {
            if let Err(err) = self.declare_holder(holder, kind) {
                tracing::debug!(%err, "holder left undeclared");
            }
        }
    }

    fn declare_holder(&mut self, holder: &Place, kind: BorrowKind) -> Result<(), StoreError> {
        let request = DeclareRequest {
            perms: kind.grants(),
            mutable: false,
            facts: TypeFacts::reference(kind),
            scope: self.current_scope(),
            holder: Some(kind),
        };
        self.store.declare(&mut self.places, holder, request)
    }

    fn drop_place(&mut self, place: &Place, at: usize) -> CheckResult {
        self.validate(place, at)?;
        if !self.facts(place).is_owning {
            return Err(self.violation(ViolationKind::InvalidDrop, Some(place), None, at));
        }
        self.access(place, PermSet::OWN, at)?;
        self.retire(place);
        Ok(())
    }

    fn release(&mut self, holder: &Place, at: usize) -> CheckResult {
        self.validate(holder, at)?;
        let released = self.loans.release_held_by(&self.places, holder);
        tracing::debug!(index = at, released = released.len(), "loans released explicitly");
        Ok(())
    }

    fn split(&mut self, array: &Place, boundary: u64, at: usize) -> CheckResult {
        self.check_live(array, at)?;
        let scope = self.current_scope();
        self.loans.split(&mut self.places, array, boundary, scope);
        Ok(())
    }

    /// Checks that `place` currently has every permission in `needs`.
    ///
    /// A read blocked by a live loan is a conflicting borrow; everything else
    /// is reported as the first missing permission, with the loan that took
    /// it away when there is one.
    fn access(&self, place: &Place, needs: PermSet, at: usize) -> CheckResult {
        self.check_live(place, at)?;
        let missing = self.perms(place, at)?.missing(needs);
        if missing.is_empty() {
            return Ok(());
        }

        if missing.contains(PermSet::READ) {
            let blocker = self.loans.blocking(&self.places, place, PermSet::READ);
            let kind = if blocker.is_some() {
                ViolationKind::ConflictingBorrow
            } else {
                ViolationKind::MissingReadPermission
            };
            return Err(self.violation(kind, Some(place), blocker, at));
        }

        let (kind, perm) = if missing.contains(PermSet::WRITE) {
            (ViolationKind::MissingWritePermission, PermSet::WRITE)
        } else {
            (ViolationKind::MissingOwnPermission, PermSet::OWN)
        };
        let blocker = self.loans.blocking(&self.places, place, perm);
        Err(self.violation(kind, Some(place), blocker, at))
    }

    /// The root is declared and every subslice in the path was introduced by
    /// a live split.
    fn validate(&self, place: &Place, at: usize) -> CheckResult {
        if self.store.declaration(place.root).is_none() {
            return Err(self.violation(ViolationKind::UnknownPath, Some(place), None, at));
        }
        let unsplit = place
            .subslices()
            .any(|(array, from, to)| !self.loans.is_split(&self.places, &array, from, to));
        if unsplit {
            return Err(self.violation(ViolationKind::UnknownPath, Some(place), None, at));
        }
        Ok(())
    }

    fn check_live(&self, place: &Place, at: usize) -> CheckResult {
        self.validate(place, at)?;
        self.store
            .check_live(&self.places, place)
            .map(|_| ())
            .map_err(|err| self.store_violation(err, place, at))
    }

    fn perms(&self, place: &Place, at: usize) -> CheckResult<PermSet> {
        self.store
            .get(&self.places, &self.loans, place)
            .map_err(|err| self.store_violation(err, place, at))
    }

    fn facts(&self, place: &Place) -> TypeFacts {
        self.store
            .facts(&self.places, place)
            .unwrap_or_default()
    }

    /// Retires `place` and ends every loan it still holds.
    fn retire(&mut self, place: &Place) {
        self.loans.release_held_by(&self.places, place);
        self.store.retire(&mut self.places, place);
        tracing::debug!(root = ?place.root, depth = place.projection.len(), "path retired");
    }

    fn current_scope(&self) -> ScopeId {
        self.scopes.last().map_or(ScopeId::ROOT, |scope| scope.id)
    }

    fn loan_info(&self, loan: &Loan) -> LoanInfo {
        LoanInfo {
            id: loan.id,
            source: self.places.lookup(loan.source).clone(),
            kind: loan.kind,
            holder: self.places.lookup(loan.holder).clone(),
            created_at: loan.created_at,
        }
    }

    fn violation(
        &self,
        kind: ViolationKind,
        place: Option<&Place>,
        loan: Option<&Loan>,
        at: usize,
    ) -> Violation {
        Violation {
            kind,
            place: place.cloned(),
            conflicting_loan: loan.map(|loan| self.loan_info(loan)),
            operation_index: at,
        }
    }

    fn store_violation(&self, err: StoreError, place: &Place, at: usize) -> Violation {
        let kind = match err {
            StoreError::UnknownPath => ViolationKind::UnknownPath,
            StoreError::DuplicatePath => ViolationKind::DuplicatePath,
            StoreError::UseAfterMove => ViolationKind::UseAfterMove,
            StoreError::NotMutable => ViolationKind::MissingWritePermission,
        };
        self.violation(kind, Some(place), None, at)
    }
}
