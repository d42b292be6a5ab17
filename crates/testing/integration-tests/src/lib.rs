//! Integration test utilities for the Warden checker

use std::sync::Once;

use proptest::test_runner::Config as ProptestConfig;
use wd_check::{CheckMode, CheckerConfig, CheckerEngine, Operation, Verdict, ViolationKind};
use wd_intern::Interner;
use wd_place::Place;

static LOGGING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per test binary.
///
/// Respects `RUST_LOG`; silent otherwise.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Proptest settings shared by the property suites.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

/// Test fixture helper: names variables and collects operations.
#[derive(Debug, Default)]
pub struct Program {
    /// Interner the places are named through
    pub interner: Interner,
    /// Operations in program order
    pub ops: Vec<Operation>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The root place `name`.
    #[must_use]
    pub fn var(&self, name: &str) -> Place {
        Place::root(self.interner.intern(name))
    }

    /// The field `name` of `base`.
    #[must_use]
    pub fn field(&self, base: &Place, name: &str) -> Place {
        base.field(self.interner.intern(name))
    }

    /// Appends an operation, returning its index.
    pub fn push(&mut self, op: Operation) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    /// Runs the program in `mode`.
    #[must_use]
    pub fn check(&self, mode: CheckMode) -> Vec<Verdict> {
        wd_check::check(&self.ops, mode)
    }

    /// Runs the program and returns the engine for state queries.
    #[must_use]
    pub fn run(&self, config: CheckerConfig) -> (CheckerEngine, Vec<Verdict>) {
        let mut engine = CheckerEngine::new(config);
        let verdicts = engine.run(&self.ops);
        (engine, verdicts)
    }

    /// Renders verdicts one per line, the way the snapshot tests compare
    /// them.
    #[must_use]
    pub fn render(&self, verdicts: &[Verdict]) -> String {
        let mut out = String::new();
        for (idx, verdict) in verdicts.iter().enumerate() {
            let line = match verdict {
                Verdict::Ok => "ok".to_string(),
                Verdict::Unchecked => "unchecked".to_string(),
                Verdict::Violation(violation) => {
                    format!("{:?}: {}", violation.kind, violation.message(&self.interner))
                }
            };
            out.push_str(&format!("{idx}: {line}\n"));
        }
        out
    }
}

/// The violation kind of each verdict, `None` where the operation passed or
/// was not checked.
#[must_use]
pub fn kinds(verdicts: &[Verdict]) -> Vec<Option<ViolationKind>> {
    verdicts
        .iter()
        .map(|verdict| verdict.violation().map(|violation| violation.kind))
        .collect()
}
