// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution of the test body.
//!
//! The body is run either once, through the [`Executor`] configured on the
//! test unit, or once per data row, through a [`DataSource`]. Failures raised
//! by either are turned into a single synthetic raw result here, so they never
//! reach the orchestrator.

use crate::{
    context::SharedContext,
    errors::UnitFailure,
    helpers::call_guarded,
    outcome::UnitOutcome,
    record::{FailureDetail, FailureKind, RawResult},
    unit::TestUnit,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Runs the body of a test unit once.
pub trait Executor: Send + Sync {
    /// Executes the test body, returning one raw result per attempt.
    ///
    /// For a regular test this is exactly one result.
    fn execute(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<Vec<RawResult>, UnitFailure>;
}

impl<F> Executor for F
where
    F: Fn(&TestUnit, &mut dyn SharedContext) -> Result<Vec<RawResult>, UnitFailure> + Send + Sync,
{
    fn execute(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<Vec<RawResult>, UnitFailure> {
        (self)(unit, context)
    }
}

/// Wraps a closure as a shared [`Executor`].
pub fn from_fn<F>(f: F) -> Arc<dyn Executor>
where
    F: Fn(&TestUnit, &mut dyn SharedContext) -> Result<Vec<RawResult>, UnitFailure>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Expands a test unit into data-driven iterations.
pub trait DataSource: Send + Sync {
    /// Returns true if the unit should run once per data row.
    fn has_data_driven_iterations(&self, unit: &TestUnit) -> bool;

    /// Runs every iteration through `executor`, returning raw results in data-row order.
    fn run_data_driven(
        &self,
        context: &mut dyn SharedContext,
        unit: &TestUnit,
        executor: &dyn Executor,
    ) -> Result<Vec<RawResult>, UnitFailure>;
}

/// A [`DataSource`] for hosts without data-driven tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoDataSource;

impl DataSource for NoDataSource {
    fn has_data_driven_iterations(&self, _unit: &TestUnit) -> bool {
        false
    }

    fn run_data_driven(
        &self,
        _context: &mut dyn SharedContext,
        _unit: &TestUnit,
        _executor: &dyn Executor,
    ) -> Result<Vec<RawResult>, UnitFailure> {
        Ok(Vec::new())
    }
}

/// Runs the body of `unit`.
///
/// Returns `None` if the unit has no executor configured.
pub(crate) fn run_body(
    unit: &TestUnit,
    context: &mut dyn SharedContext,
    data_source: &dyn DataSource,
    catch_panics: bool,
) -> Option<Vec<RawResult>> {
    let Some(executor) = unit.options().executor() else {
        error!(test = %unit, assembly = unit.assembly(), "no executor configured for test");
        return None;
    };

    let res = call_guarded(catch_panics, || {
        let data_driven = data_source.has_data_driven_iterations(unit);
        debug!(test = %unit, data_driven, "executing test body");
        if data_driven {
            data_source.run_data_driven(context, unit, &**executor)
        } else {
            executor.execute(unit, context)
        }
    });

    match res {
        Ok(results) => Some(results),
        Err(failure) => {
            debug!(test = %unit, %failure, "test body execution failed");
            Some(vec![body_failure_result(&failure)])
        }
    }
}

fn body_failure_result(failure: &UnitFailure) -> RawResult {
    let (_, detail) = failure.resolve();
    RawResult::failed(
        UnitOutcome::Error,
        FailureDetail::new(
            FailureKind::Error,
            format!("error executing test body: {}", detail.message()),
        )
        .with_location(detail.location().cloned()),
    )
}
