//! End-to-end checks of whole operation streams
//!
//! Each test lowers a small program by hand and compares the rendered
//! verdicts against a snapshot.

use expect_test::expect;
use integration_tests::{Program, init_test_logging, kinds};
use wd_check::{
    BorrowKind, CheckMode, CheckerConfig, Operation, PermSet, Region, ScopeId, TypeFacts,
    ViolationKind,
};

/// An exclusive loan takes Write away from its source
#[test]
fn test_mutating_exclusively_borrowed_source() {
    init_test_logging();
    let mut program = Program::new();
    let x = program.var("x");
    let x_ref = program.var("x_ref");
    program.push(Operation::bind_mut(x.clone()));
    program.push(Operation::borrow_mut(x.clone(), x_ref.clone(), Region::span(1, 4)));
    program.push(Operation::read(x_ref));
    program.push(Operation::Mutate(x));

    let verdicts = program.check(CheckMode::CollectAll);
    expect![[r#"
        0: ok
        1: ok
        2: ok
        3: MissingWritePermission: cannot write to `x`: exclusive borrow of `x` by `x_ref` (operation 1)
    "#]]
    .assert_eq(&program.render(&verdicts));
}

/// Loans on one field leave its siblings alone
#[test]
fn test_field_sensitivity() {
    init_test_logging();
    let mut program = Program::new();
    let a = program.var("a");
    let ax = program.field(&a, "x");
    let ay = program.field(&a, "y");
    program.push(Operation::bind_mut(a));
    program.push(Operation::Project {
        place: ax.clone(),
        facts: TypeFacts::OWNED,
    });
    program.push(Operation::Project {
        place: ay.clone(),
        facts: TypeFacts::OWNED,
    });
    program.push(Operation::borrow_mut(ax, program.var("rx"), Region::span(3, 5)));
    program.push(Operation::read(ay.clone()));
    program.push(Operation::Mutate(ay));

    let verdicts = program.check(CheckMode::FailFast);
    expect![[r#"
        0: ok
        1: ok
        2: ok
        3: ok
        4: ok
        5: ok
    "#]]
    .assert_eq(&program.render(&verdicts));
}

/// Without a split every index is the same element
#[test]
fn test_index_collapse() {
    init_test_logging();
    let mut program = Program::new();
    let arr = program.var("arr");
    program.push(Operation::bind_mut(arr.clone()));
    program.push(Operation::borrow_mut(arr.index(), program.var("x"), Region::span(1, 4)));
    program.push(Operation::read(arr.index()));

    let verdicts = program.check(CheckMode::CollectAll);
    expect![[r#"
        0: ok
        1: ok
        2: ConflictingBorrow: cannot access `arr[_]` because it is already borrowed: exclusive borrow of `arr[_]` by `x` (operation 1)
    "#]]
    .assert_eq(&program.render(&verdicts));
}

/// A split makes the halves independent
#[test]
fn test_split_array() {
    init_test_logging();
    let mut program = Program::new();
    let arr = program.var("arr");
    let (left, right) = arr.split_halves(2);
    program.push(Operation::bind_mut(arr.clone()));
    program.push(Operation::Split {
        array: arr,
        boundary: 2,
    });
    program.push(Operation::borrow_mut(left.index(), program.var("x"), Region::span(2, 4)));
    program.push(Operation::read(right.index()));

    let verdicts = program.check(CheckMode::FailFast);
    assert_eq!(kinds(&verdicts), vec![None; 4]);
}

/// A moved-out variable is dead, its new home is not
#[test]
fn test_use_after_move() {
    init_test_logging();
    let mut program = Program::new();
    let s = program.var("s");
    let s2 = program.var("s2");
    program.push(Operation::bind(s.clone()));
    program.push(Operation::bind_move(s2.clone(), s.clone()));
    program.push(Operation::read(s));
    program.push(Operation::read(s2.clone()));
    program.push(Operation::Drop(s2));

    let verdicts = program.check(CheckMode::CollectAll);
    expect![[r#"
        0: ok
        1: ok
        2: UseAfterMove: `s` has been moved out or dropped and can no longer be used
        3: ok
        4: ok
    "#]]
    .assert_eq(&program.render(&verdicts));
}

#[test]
fn test_fail_fast_marks_rest_unchecked() {
    init_test_logging();
    let mut program = Program::new();
    let s = program.var("s");
    program.push(Operation::bind(s.clone()));
    program.push(Operation::Move(s.clone()));
    program.push(Operation::Move(s.clone()));
    program.push(Operation::read(s));

    let verdicts = program.check(CheckMode::FailFast);
    expect![[r#"
        0: ok
        1: ok
        2: UseAfterMove: `s` has been moved out or dropped and can no longer be used
        3: unchecked
    "#]]
    .assert_eq(&program.render(&verdicts));
}

#[test]
fn test_nested_scopes_release_in_order() {
    init_test_logging();
    let mut program = Program::new();
    let v = program.var("v");
    let outer = ScopeId(1);
    let inner = ScopeId(2);
    program.push(Operation::bind_mut(v.clone()));
    program.push(Operation::ScopeBegin(outer));
    program.push(Operation::borrow(v.clone(), program.var("r1"), Region::Scope(outer)));
    program.push(Operation::ScopeBegin(inner));
    program.push(Operation::borrow(v.clone(), program.var("r2"), Region::Scope(inner)));
    program.push(Operation::ScopeEnd(inner));
    program.push(Operation::Mutate(v.clone()));
    program.push(Operation::ScopeEnd(outer));
    program.push(Operation::Mutate(v.clone()));

    let (engine, verdicts) = program.run(CheckerConfig::default());
    assert_eq!(
        kinds(&verdicts),
        vec![
            None,
            None,
            None,
            None,
            None,
            None,
            Some(ViolationKind::MissingWritePermission),
            None,
            None
        ]
    );
    assert!(engine.loans().is_empty());
    assert_eq!(engine.permissions(&v), Some(PermSet::ALL));
}

#[test]
fn test_reference_escaping_its_scope() {
    init_test_logging();
    let mut program = Program::new();
    let r = program.var("r");
    let x = program.var("x");
    let body = ScopeId(1);
    program.push(Operation::bind_mut(r.clone()));
    program.push(Operation::ScopeBegin(body));
    program.push(Operation::bind(x.clone()));
    program.push(Operation::borrow(x, r.clone(), Region::Scope(ScopeId::ROOT)));
    program.push(Operation::ScopeEnd(body));
    program.push(Operation::read(r));

    let verdicts = program.check(CheckMode::CollectAll);
    expect![[r#"
        0: ok
        1: ok
        2: ok
        3: ok
        4: LoanOutlivesSource: borrow involving `x` outlives what it borrows from: shared borrow of `x` by `r` (operation 3)
        5: ok
    "#]]
    .assert_eq(&program.render(&verdicts));
}

#[test]
fn test_reborrow_through_shared_reference() {
    init_test_logging();
    let mut program = Program::new();
    let v = program.var("v");
    let r = program.var("r");
    program.push(Operation::bind(v.clone()));
    program.push(Operation::borrow(v.clone(), r.clone(), Region::span(1, 6)));
    program.push(Operation::borrow(r.deref(), program.var("r2"), Region::span(2, 2)));
    program.push(Operation::Borrow {
        source: r.deref(),
        kind: BorrowKind::Exclusive,
        holder: program.var("w"),
        region: Region::span(3, 5),
    });
    program.push(Operation::read(v));

    let verdicts = program.check(CheckMode::CollectAll);
    assert_eq!(
        kinds(&verdicts),
        vec![
            None,
            None,
            None,
            Some(ViolationKind::MissingWritePermission),
            None
        ]
    );
}
