//! Declared permissions and retirement of paths.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use wd_intern::Symbol;
use wd_place::{Place, PlaceId, PlaceTable, Projection, conflicts, is_prefix};

use crate::{
    error::{StoreError, StoreResult},
    loans::{BorrowKind, LoanTable},
    perms::PermSet,
    region::ScopeId,
};

/// Facts about a value's type, supplied by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeFacts {
    /// The value owns a resource: it can be moved and must be dropped.
    pub is_owning: bool,
    /// The value can be duplicated bit-for-bit (Copy-like).
    pub is_trivially_duplicable: bool,
}

impl TypeFacts {
    /// An owning, non-duplicable value such as a heap string.
    pub const OWNED: Self = Self {
        is_owning: true,
        is_trivially_duplicable: false,
    };

    /// A plain value such as an integer.
    pub const COPY: Self = Self {
        is_owning: false,
        is_trivially_duplicable: true,
    };

    /// What a loan holder of `kind` looks like: shared references can be
    /// duplicated, exclusive ones cannot, neither owns.
    #[must_use]
    pub const fn reference(kind: BorrowKind) -> Self {
        Self {
            is_owning: false,
            is_trivially_duplicable: matches!(kind, BorrowKind::Shared),
        }
    }
}

impl Default for TypeFacts {
    fn default() -> Self {
        Self::OWNED
    }
}

/// A live (or retired) root variable.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// The root place
    pub place: PlaceId,
    /// Permissions of the variable itself before any loan is taken into
    /// account. For a holder this is about the binding, not the referent.
    pub perms: PermSet,
    /// Type facts of the whole variable
    pub facts: TypeFacts,
    /// Scope the variable was declared in
    pub scope: ScopeId,
    /// Position in declaration order, used for drop ordering
    pub order: u32,
    /// Whether the binding itself may be reassigned
    pub mutable: bool,
    /// Set when the variable holds a reference created by a borrow
    pub holder: Option<BorrowKind>,
    /// Cleared once the variable is moved out or dropped
    pub live: bool,
}

/// Everything needed to declare a path.
#[derive(Debug, Clone, Copy)]
pub struct DeclareRequest {
    /// Permissions requested by the binding; ignored for holders
    pub perms: PermSet,
    /// Whether the binding is mutable. Without it Write is dropped.
    pub mutable: bool,
    /// Type facts of the bound value; non-owning values never get Own
    pub facts: TypeFacts,
    /// Scope the binding belongs to
    pub scope: ScopeId,
    /// Set for reference bindings created by a borrow
    pub holder: Option<BorrowKind>,
}

impl DeclareRequest {
    /// The permissions this request ends up declaring.
    ///
    /// A holder binding can be read, and reassigned when mutable. What the
    /// reference allows on its referent comes from the loan kind instead.
    #[must_use]
    pub fn declared_perms(&self) -> PermSet {
        let mut perms = match self.holder {
            Some(_) => PermSet::READ_WRITE,
            None => self.perms,
        };
        if !self.mutable {
            perms = perms - PermSet::WRITE;
        }
        if !self.facts.is_owning {
            perms = perms - PermSet::OWN;
        }
        perms
    }
}

/// Per-path permission bookkeeping.
///
/// Only declarations and retirements are stored. The permissions of a path
/// are computed on demand: the root's declared set, narrowed by the type
/// facts of the path, minus whatever the live loans suspend.
#[derive(Debug, Clone, Default)]
pub struct PermissionStore {
    roots: FxHashMap<Symbol, Declaration>,
    retired: FxHashSet<PlaceId>,
    facts: FxHashMap<PlaceId, TypeFacts>,
    next_order: u32,
}

impl PermissionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `place`.
    ///
    /// For a root this introduces (or revives) a variable. For a projected
    /// place it re-initialises a part that was moved out earlier, which needs
    /// the root to be mutable.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicatePath`] if the place is declared and live
    /// - [`StoreError::UnknownPath`] if a projected place has no root
    /// - [`StoreError::UseAfterMove`] if a projected place sits under a
    ///   retired path other than itself
    /// - [`StoreError::NotMutable`] if the root of a projected place is immutable
    pub fn declare(
        &mut self,
        places: &mut PlaceTable,
        place: &Place,
        request: DeclareRequest,
    ) -> StoreResult<()> {
        let id = places.intern(place);

        if place.is_root() {
            if self.roots.get(&place.root).is_some_and(|decl| decl.live) {
                return Err(StoreError::DuplicatePath);
            }
            self.retired
                .retain(|retired| places.lookup(*retired).root != place.root);
            self.facts
                .retain(|registered, _| places.lookup(*registered).root != place.root);
            let order = self.next_order;
            self.next_order += 1;
            self.roots.insert(
                place.root,
                Declaration {
                    place: id,
                    perms: request.declared_perms(),
                    facts: request.facts,
                    scope: request.scope,
                    order,
                    mutable: request.mutable,
                    holder: request.holder,
                    live: true,
                },
            );
            return Ok(());
        }

        let decl = self.root_decl(place)?;
        if !decl.live {
            return Err(StoreError::UseAfterMove);
        }
        if !decl.perms.contains(PermSet::WRITE) {
            return Err(StoreError::NotMutable);
        }

        let mut revived = false;
        let mut blocked = false;
        for retired in &self.retired {
            let retired_place = places.lookup(*retired);
            if is_prefix(place, retired_place) {
                revived = true;
            } else if conflicts(place, retired_place) {
                blocked = true;
            }
        }
        if blocked {
            return Err(StoreError::UseAfterMove);
        }
        if !revived {
            return Err(StoreError::DuplicatePath);
        }

        self.retired
            .retain(|retired| !is_prefix(place, places.lookup(*retired)));
        self.facts.insert(id, request.facts);
        Ok(())
    }

    /// Records type facts for a projected place.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPath`] if the root was never declared.
    pub fn register_facts(
        &mut self,
        places: &mut PlaceTable,
        place: &Place,
        facts: TypeFacts,
    ) -> StoreResult<()> {
        self.root_decl(place)?;
        let id = places.intern(place);
        self.facts.insert(id, facts);
        Ok(())
    }

    /// Type facts of `place`: its own registration, else the nearest
    /// registered ancestor, else the root declaration.
    #[must_use]
    pub fn facts(&self, places: &PlaceTable, place: &Place) -> Option<TypeFacts> {
        let decl = self.roots.get(&place.root)?;
        std::iter::once(place.clone())
            .chain(place.ancestors())
            .filter(|candidate| !candidate.is_root())
            .find_map(|candidate| {
                places
                    .get(&candidate)
                    .and_then(|id| self.facts.get(&id))
                    .copied()
            })
            .or(Some(decl.facts))
    }

    /// Permissions `place` currently has.
    ///
    /// Retired paths have none.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPath`] if the root was never declared.
    pub fn get(&self, places: &PlaceTable, loans: &LoanTable, place: &Place) -> StoreResult<PermSet> {
        if self.check_live(places, place).is_err() {
            self.root_decl(place)?;
            return Ok(PermSet::EMPTY);
        }
        Ok(self.declared(places, place)? - loans.suspended(places, place))
    }

    /// Permissions `place` would have with no loans live.
    ///
    /// Paths reached through a holder's reference get what the loan grants;
    /// the holder variable itself keeps its binding permissions.
    ///
    /// # Errors
    ///
    /// [`StoreError::UnknownPath`] if the root was never declared.
    pub fn declared(&self, places: &PlaceTable, place: &Place) -> StoreResult<PermSet> {
        let decl = self.root_decl(place)?;
        let mut perms = match decl.holder {
            Some(kind) if place.projection.first() == Some(&Projection::Deref) => kind.grants(),
            _ => decl.perms,
        };
        if self
            .facts(places, place)
            .is_some_and(|facts| !facts.is_owning)
        {
            perms = perms - PermSet::OWN;
        }
        Ok(perms)
    }

    /// Checks that `place` is declared and nothing it overlaps was retired.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownPath`] if the root was never declared
    /// - [`StoreError::UseAfterMove`] if the root, the place, an ancestor or
    ///   a part of it was moved out or dropped
    pub fn check_live(&self, places: &PlaceTable, place: &Place) -> StoreResult<&Declaration> {
        let decl = self.root_decl(place)?;
        if !decl.live {
            return Err(StoreError::UseAfterMove);
        }
        let moved = self
            .retired
            .iter()
            .any(|retired| conflicts(places.lookup(*retired), place));
        if moved {
            return Err(StoreError::UseAfterMove);
        }
        Ok(decl)
    }

    /// Retires `place` permanently.
    ///
    /// Retiring a root ends the variable; retiring a projection is a partial
    /// move that also makes the parent unusable as a whole.
    pub fn retire(&mut self, places: &mut PlaceTable, place: &Place) {
        if place.is_root() {
            if let Some(decl) = self.roots.get_mut(&place.root) {
                decl.live = false;
            }
        } else {
            let id = places.intern(place);
            self.retired.insert(id);
        }
    }

    /// Points the live root variable `root` at a new loan of `kind`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownPath`] if `root` was never declared
    /// - [`StoreError::UseAfterMove`] if it is no longer live
    /// - [`StoreError::NotMutable`] if the binding cannot be reassigned
    pub fn assign_holder(&mut self, root: Symbol, kind: BorrowKind) -> StoreResult<()> {
        let decl = self.roots.get_mut(&root).ok_or(StoreError::UnknownPath)?;
        if !decl.live {
            return Err(StoreError::UseAfterMove);
        }
        if !decl.mutable {
            return Err(StoreError::NotMutable);
        }
        decl.holder = Some(kind);
        decl.perms = PermSet::READ_WRITE;
        decl.facts = TypeFacts::reference(kind);
        Ok(())
    }

    /// The declaration of `root`, live or not.
    #[must_use]
    pub fn declaration(&self, root: Symbol) -> Option<&Declaration> {
        self.roots.get(&root)
    }

    /// Live roots declared in `scope`, latest declaration first.
    #[must_use]
    pub fn live_in_scope(&self, scope: ScopeId) -> Vec<&Declaration> {
        let mut decls: Vec<_> = self
            .roots
            .values()
            .filter(|decl| decl.live && decl.scope == scope)
            .collect();
        decls.sort_by(|a, b| b.order.cmp(&a.order));
        decls
    }

    fn root_decl(&self, place: &Place) -> StoreResult<&Declaration> {
        self.roots.get(&place.root).ok_or(StoreError::UnknownPath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loans::{LoanRequest, ReborrowNesting};
    use crate::region::Region;
    use wd_intern::Interner;

    fn owned(mutable: bool) -> DeclareRequest {
        DeclareRequest {
            perms: PermSet::ALL,
            mutable,
            facts: TypeFacts::OWNED,
            scope: ScopeId::ROOT,
            holder: None,
        }
    }

    #[test]
    fn test_declare_and_get() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let loans = LoanTable::new();
        let x = Place::root(interner.intern("x"));
        let y = Place::root(interner.intern("y"));

        store.declare(&mut places, &x, owned(true)).unwrap();
        store.declare(&mut places, &y, owned(false)).unwrap();
        assert_eq!(store.get(&places, &loans, &x), Ok(PermSet::ALL));
        assert_eq!(
            store.get(&places, &loans, &y),
            Ok(PermSet::READ | PermSet::OWN)
        );
        assert_eq!(
            store.declare(&mut places, &x, owned(true)),
            Err(StoreError::DuplicatePath)
        );
    }

    #[test]
    fn test_unknown_path() {
        let interner = Interner::new();
        let places = PlaceTable::new();
        let store = PermissionStore::new();
        let loans = LoanTable::new();
        let z = Place::root(interner.intern("z"));
        assert_eq!(
            store.get(&places, &loans, &z),
            Err(StoreError::UnknownPath)
        );
    }

    #[test]
    fn test_retire_root_and_redeclare() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let loans = LoanTable::new();
        let s = Place::root(interner.intern("s"));
        let field = s.field(interner.intern("len"));

        store.declare(&mut places, &s, owned(false)).unwrap();
        store.retire(&mut places, &s);
        assert_eq!(store.get(&places, &loans, &s), Ok(PermSet::EMPTY));
        assert_eq!(
            store.check_live(&places, &field).map(|_| ()),
            Err(StoreError::UseAfterMove)
        );

        store.declare(&mut places, &s, owned(false)).unwrap();
        assert!(store.check_live(&places, &field).is_ok());
    }

    #[test]
    fn test_partial_move() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let a = Place::root(interner.intern("a"));
        let ax = a.field(interner.intern("x"));
        let ay = a.field(interner.intern("y"));

        store.declare(&mut places, &a, owned(true)).unwrap();
        store.retire(&mut places, &ax);
        assert!(store.check_live(&places, &ay).is_ok());
        assert!(store.check_live(&places, &ax).is_err());
        assert!(store.check_live(&places, &a).is_err());

        // Re-initialising the moved field brings the whole back.
        store.declare(&mut places, &ax, owned(true)).unwrap();
        assert!(store.check_live(&places, &a).is_ok());
        assert_eq!(
            store.declare(&mut places, &ay, owned(true)),
            Err(StoreError::DuplicatePath)
        );
    }

    #[test]
    fn test_reinit_requires_mutable_root() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let a = Place::root(interner.intern("a"));
        let ax = a.field(interner.intern("x"));

        store.declare(&mut places, &a, owned(false)).unwrap();
        store.retire(&mut places, &ax);
        assert_eq!(
            store.declare(&mut places, &ax, owned(false)),
            Err(StoreError::NotMutable)
        );
    }

    #[test]
    fn test_facts_inherit_from_ancestors() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let loans = LoanTable::new();
        let a = Place::root(interner.intern("a"));
        let count = a.field(interner.intern("count"));

        store.declare(&mut places, &a, owned(true)).unwrap();
        assert_eq!(store.facts(&places, &count), Some(TypeFacts::OWNED));

        store
            .register_facts(&mut places, &count, TypeFacts::COPY)
            .unwrap();
        assert_eq!(store.facts(&places, &count), Some(TypeFacts::COPY));
        assert_eq!(store.facts(&places, &count.index()), Some(TypeFacts::COPY));
        assert_eq!(
            store.get(&places, &loans, &count),
            Ok(PermSet::READ_WRITE)
        );
    }

    #[test]
    fn test_loans_suspend_and_restore() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let mut loans = LoanTable::new();
        let x = Place::root(interner.intern("x"));
        let r = Place::root(interner.intern("r"));
        store.declare(&mut places, &x, owned(true)).unwrap();

        let before = store.get(&places, &loans, &x).unwrap();
        let request = LoanRequest {
            source: places.intern(&x),
            kind: BorrowKind::Shared,
            holder: places.intern(&r),
            region: Region::span(1, 3),
            end: 3,
            at: 1,
        };
        let id = loans
            .borrow(&places, request, ReborrowNesting::Strict)
            .unwrap();
        assert_eq!(store.get(&places, &loans, &x), Ok(PermSet::READ));

        loans.release(id);
        assert_eq!(store.get(&places, &loans, &x), Ok(before));
    }

    #[test]
    fn test_assign_holder_needs_mutable_binding() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let r = Place::root(interner.intern("r"));
        let q = Place::root(interner.intern("q"));
        let binding = DeclareRequest {
            facts: TypeFacts::reference(BorrowKind::Shared),
            ..owned(true)
        };

        store.declare(&mut places, &r, binding).unwrap();
        store
            .declare(&mut places, &q, DeclareRequest { mutable: false, ..binding })
            .unwrap();

        assert_eq!(store.assign_holder(r.root, BorrowKind::Exclusive), Ok(()));
        let decl = store.declaration(r.root).unwrap();
        assert_eq!(decl.holder, Some(BorrowKind::Exclusive));
        assert_eq!(decl.perms, PermSet::READ_WRITE);
        assert_eq!(
            store.assign_holder(q.root, BorrowKind::Shared),
            Err(StoreError::NotMutable)
        );
    }

    #[test]
    fn test_holder_binding_and_referent_perms_differ() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        let loans = LoanTable::new();
        let r = Place::root(interner.intern("r"));
        let q = Place::root(interner.intern("q"));
        let holder = |mutable, kind| DeclareRequest {
            perms: PermSet::EMPTY,
            mutable,
            facts: TypeFacts::reference(kind),
            scope: ScopeId::ROOT,
            holder: Some(kind),
        };

        store
            .declare(&mut places, &r, holder(true, BorrowKind::Shared))
            .unwrap();
        assert_eq!(store.get(&places, &loans, &r), Ok(PermSet::READ_WRITE));
        assert_eq!(store.get(&places, &loans, &r.deref()), Ok(PermSet::READ));

        store
            .declare(&mut places, &q, holder(false, BorrowKind::Exclusive))
            .unwrap();
        assert_eq!(store.get(&places, &loans, &q), Ok(PermSet::READ));
        assert_eq!(
            store.get(&places, &loans, &q.deref()),
            Ok(PermSet::READ_WRITE)
        );

        store.assign_holder(r.root, BorrowKind::Shared).unwrap();
        assert_eq!(store.get(&places, &loans, &r), Ok(PermSet::READ_WRITE));
    }

    #[test]
    fn test_live_in_scope_order() {
        let interner = Interner::new();
        let mut places = PlaceTable::new();
        let mut store = PermissionStore::new();
        for name in ["a", "b", "c"] {
            let place = Place::root(interner.intern(name));
            store.declare(&mut places, &place, owned(false)).unwrap();
        }
        let order: Vec<_> = store
            .live_in_scope(ScopeId::ROOT)
            .iter()
            .map(|decl| interner.resolve(&places.lookup(decl.place).root))
            .collect();
        assert_eq!(order, ["c", "b", "a"]);
    }
}
