// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test method runner.
//!
//! [`TestMethodRunner::execute`] drives a single test unit through the ignore
//! check, lifecycle initialization, body execution and result conversion. The
//! runner holds no mutable state, so one instance can be shared by any number
//! of worker threads executing different units.

use crate::{
    attributes::{AttributeInspector, NoMarkers, resolve_ignore},
    capture::{DiagnosticCapture, NoCapture},
    config::RunnerConfig,
    context::SharedContext,
    errors::{RunnerError, UnitFailure},
    executor::{DataSource, NoDataSource, run_body},
    lifecycle::{LifecycleHooks, LifecycleRunner, NoHooks},
    outcome::{UnitOutcome, aggregate_outcomes},
    record::{Diagnostics, FailureDetail, FailureKind, RawResult, ResultRecord, UnitResults},
    time::{StopwatchStart, stopwatch},
    unit::TestUnit,
};
use debug_ignore::DebugIgnore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestMethodRunnerBuilder {
    inspector: DebugIgnore<Option<Arc<dyn AttributeInspector>>>,
    hooks: DebugIgnore<Option<Arc<dyn LifecycleHooks>>>,
    data_source: DebugIgnore<Option<Arc<dyn DataSource>>>,
    capture: DebugIgnore<Option<Arc<dyn DiagnosticCapture>>>,
    config: Option<RunnerConfig>,
}

impl TestMethodRunnerBuilder {
    /// Sets the inspector used to look up ignore markers.
    ///
    /// Defaults to [`NoMarkers`].
    pub fn set_inspector(&mut self, inspector: Arc<dyn AttributeInspector>) -> &mut Self {
        self.inspector = DebugIgnore(Some(inspector));
        self
    }

    /// Sets the assembly and class initialization hooks.
    ///
    /// Defaults to [`NoHooks`]. Wrap hooks in
    /// [`OnceHooks`](crate::lifecycle::OnceHooks) to run each one at most once
    /// per assembly or class.
    pub fn set_hooks(&mut self, hooks: Arc<dyn LifecycleHooks>) -> &mut Self {
        self.hooks = DebugIgnore(Some(hooks));
        self
    }

    /// Sets the source of data-driven iterations.
    ///
    /// Defaults to [`NoDataSource`].
    pub fn set_data_source(&mut self, data_source: Arc<dyn DataSource>) -> &mut Self {
        self.data_source = DebugIgnore(Some(data_source));
        self
    }

    /// Sets the diagnostic capture used around lifecycle initialization.
    ///
    /// Defaults to [`NoCapture`].
    pub fn set_capture(&mut self, capture: Arc<dyn DiagnosticCapture>) -> &mut Self {
        self.capture = DebugIgnore(Some(capture));
        self
    }

    /// Sets the runner configuration.
    ///
    /// Defaults to [`RunnerConfig::default`].
    pub fn set_config(&mut self, config: RunnerConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    /// Creates a new test method runner.
    pub fn build(self) -> TestMethodRunner {
        TestMethodRunner {
            inspector: DebugIgnore(self.inspector.0.unwrap_or_else(|| Arc::new(NoMarkers))),
            hooks: DebugIgnore(self.hooks.0.unwrap_or_else(|| Arc::new(NoHooks))),
            data_source: DebugIgnore(self.data_source.0.unwrap_or_else(|| Arc::new(NoDataSource))),
            capture: DebugIgnore(self.capture.0.unwrap_or_else(|| Arc::new(NoCapture))),
            config: self.config.unwrap_or_default(),
        }
    }
}

/// Executes test units, one at a time per call.
///
/// Created with [`TestMethodRunnerBuilder`].
#[derive(Clone, Debug)]
pub struct TestMethodRunner {
    inspector: DebugIgnore<Arc<dyn AttributeInspector>>,
    hooks: DebugIgnore<Arc<dyn LifecycleHooks>>,
    data_source: DebugIgnore<Arc<dyn DataSource>>,
    capture: DebugIgnore<Arc<dyn DiagnosticCapture>>,
    config: RunnerConfig,
}

impl TestMethodRunner {
    /// Returns the configuration in use.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Executes a test unit.
    ///
    /// Test failures, including failures of lifecycle hooks and the test body,
    /// are reported as result records. An error is returned only if a
    /// collaborator is broken: the attribute inspector failed, or the
    /// diagnostic capture could not be opened.
    ///
    /// The first record carries everything captured during initialization, in
    /// front of its own diagnostics.
    pub fn execute(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<UnitResults, RunnerError> {
        let start = stopwatch();

        let ignore = resolve_ignore(&**self.inspector, unit).map_err(|err| RunnerError::Inspect {
            unit: unit.to_string(),
            err,
        })?;
        if let Some(ignore) = ignore {
            debug!(test = %unit, message = ?ignore.message, "test is ignored");
            let records = vec![ResultRecord::ignored(ignore.message)];
            return finish(unit, records, &Diagnostics::default(), &start);
        }

        let capture_trace =
            self.config.capture_trace_output() && unit.options().capture_debug_traces();
        let init = LifecycleRunner::new(
            &**self.hooks,
            &**self.capture,
            capture_trace,
            self.config.catch_panics(),
        )
        .initialize(unit, context)
        .map_err(|err| RunnerError::Capture {
            unit: unit.to_string(),
            err,
        })?;

        let records = match init.result {
            Ok(()) => self.run_and_convert(unit, context),
            Err(failure) => init_failure_records(unit, &failure, &start),
        };
        finish(unit, records, &init.diagnostics, &start)
    }

    fn run_and_convert(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Vec<ResultRecord> {
        let raw = run_body(unit, context, &**self.data_source, self.config.catch_panics())
            .unwrap_or_default();
        let raw = if raw.is_empty() {
            warn!(test = %unit, "test produced no results");
            vec![RawResult::failed(
                UnitOutcome::Unknown,
                FailureDetail::new(FailureKind::Error, self.config.missing_result_message()),
            )]
        } else {
            raw
        };

        let records: Vec<_> = raw
            .into_iter()
            .map(|raw| ResultRecord::from_raw(raw, self.config.map_inconclusive_to_failed()))
            .collect();

        let outcome = aggregate_outcomes(records.iter().map(ResultRecord::outcome))
            .unwrap_or(UnitOutcome::Unknown);
        debug!(test = %unit, %outcome, attempts = records.len(), "test body finished");
        context.set_outcome(outcome);
        records
    }
}

fn init_failure_records(
    unit: &TestUnit,
    failure: &UnitFailure,
    start: &StopwatchStart,
) -> Vec<ResultRecord> {
    if failure.test_failure().is_some() {
        debug!(test = %unit, %failure, "initialization failed");
    } else {
        warn!(test = %unit, %failure, "initialization failed");
    }

    // The body never ran, so there is nothing to merge into except a
    // placeholder covering the time spent so far.
    let placeholder = ResultRecord::from_raw(
        RawResult::new(UnitOutcome::Unknown).with_duration(start.snapshot().duration),
        false,
    );
    let (outcome, detail) = failure.resolve();
    vec![placeholder.merge_failure(outcome, detail)]
}

fn finish(
    unit: &TestUnit,
    mut records: Vec<ResultRecord>,
    init_diagnostics: &Diagnostics,
    start: &StopwatchStart,
) -> Result<UnitResults, RunnerError> {
    if let Some(first) = records.first_mut() {
        first.prefix_diagnostics(init_diagnostics);
    }

    let snapshot = start.snapshot();
    UnitResults::new(records, snapshot.start_time, snapshot.duration).ok_or_else(|| {
        RunnerError::NoResults {
            unit: unit.to_string(),
        }
    })
}
