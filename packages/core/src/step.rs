//! The common result vocabulary of all resource drivers.

use crate::error::Warning;

/// What a driver's bring-up or tear-down actually did.
///
/// Drivers re-probe live state before acting, so "nothing to do" outcomes
/// are first-class: the orchestrator (and the idempotence tests) can tell a
/// performed action from a skipped one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The mutating command ran and succeeded.
    Applied,
    /// The resource was already in the target state; nothing was invoked.
    AlreadyInPlace,
    /// The slot is disabled in configuration; vacuous success.
    Disabled,
    /// Deliberately not performed; the reason travels as a warning.
    Skipped(Warning),
}

impl StepOutcome {
    /// The warning carried by a skipped step, if any.
    pub fn warning(&self) -> Option<&Warning> {
        match self {
            StepOutcome::Skipped(warning) => Some(warning),
            _ => None,
        }
    }
}
