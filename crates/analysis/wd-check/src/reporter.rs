//! The seam between the checker and whatever renders diagnostics.

use crate::error::Violation;

/// Receives violations as the checker finds them.
///
/// The checker only produces structured records; turning them into
/// source-positioned text is the reporter's job.
pub trait DiagnosticSink {
    /// Called once per rejected operation, in operation order.
    fn report(&mut self, violation: &Violation);
}

impl DiagnosticSink for Vec<Violation> {
    fn report(&mut self, violation: &Violation) {
        self.push(violation.clone());
    }
}
