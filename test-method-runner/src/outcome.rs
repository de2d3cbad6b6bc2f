// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcomes of test executions, and how several of them reduce to one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of one execution attempt of a test unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
#[serde(rename_all = "kebab-case")]
pub enum UnitOutcome {
    /// The test passed.
    Passed,

    /// A test-level expectation failed.
    Failed,

    /// An unexpected error occurred during initialization or in the test body.
    Error,

    /// The test was deliberately skipped.
    Ignored,

    /// The executor reported that the test ran out of time.
    ///
    /// Timeouts are never enforced by this crate, only reported.
    Timeout,

    /// The executor could not decide whether the test passed.
    Inconclusive,

    /// No result could be produced.
    Unknown,
}

impl UnitOutcome {
    /// Returns true if this outcome represents a passing test.
    pub fn is_success(self) -> bool {
        matches!(self, UnitOutcome::Passed)
    }

    /// Returns a short, lowercase description of this outcome.
    pub fn to_static_str(self) -> &'static str {
        match self {
            UnitOutcome::Passed => "passed",
            UnitOutcome::Failed => "failed",
            UnitOutcome::Error => "error",
            UnitOutcome::Ignored => "ignored",
            UnitOutcome::Timeout => "timeout",
            UnitOutcome::Inconclusive => "inconclusive",
            UnitOutcome::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}

/// Reduces an ordered sequence of per-attempt outcomes into one.
///
/// Folding starts from [`UnitOutcome::Passed`]:
///
/// * `Passed` never changes the aggregate.
/// * Once the aggregate is `Failed`, it stays `Failed`.
/// * A `Timeout` aggregate is only replaced by a later `Failed`.
/// * Any other non-passing outcome replaces the aggregate.
///
/// Returns `None` for an empty sequence: there is nothing to aggregate, and the
/// caller decides what an absent result means.
pub fn aggregate_outcomes<I>(outcomes: I) -> Option<UnitOutcome>
where
    I: IntoIterator<Item = UnitOutcome>,
{
    let mut outcomes = outcomes.into_iter().peekable();
    outcomes.peek()?;

    Some(outcomes.fold(UnitOutcome::Passed, |aggregate, outcome| {
        if outcome == UnitOutcome::Passed || aggregate == UnitOutcome::Failed {
            return aggregate;
        }
        // A timeout can only be overridden by a failure.
        if outcome == UnitOutcome::Failed || aggregate != UnitOutcome::Timeout {
            outcome
        } else {
            aggregate
        }
    }))
}
