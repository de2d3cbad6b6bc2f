// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Result records produced by executing a test unit.
//!
//! Executors produce [`RawResult`]s, one per attempt. The runner converts them
//! into [`ResultRecord`]s, which are immutable once handed back to the caller
//! as a [`UnitResults`].

use crate::outcome::{UnitOutcome, aggregate_outcomes};
use camino::Utf8PathBuf;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::{error::Error, fmt, panic::Location, time::Duration};

/// The kind of a failure detail.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// A deliberate skip. Not a failure, but carries the ignore message.
    Ignored,

    /// A test-level expectation failed.
    AssertionFailure,

    /// An unexpected error.
    Error,

    /// The executor reported a timeout.
    Timeout,
}

/// Where a failure happened, as a list of frames, innermost first.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TraceLocation {
    frames: Vec<String>,
}

impl TraceLocation {
    /// Creates a location from a list of frames.
    pub fn new(frames: Vec<String>) -> Self {
        Self { frames }
    }

    /// Returns the location of the caller.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            frames: vec![format!(
                "at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            )],
        }
    }

    /// Builds a location out of the source chain of an error.
    ///
    /// Returns `None` if the error has no sources.
    pub fn from_error_sources(err: &(dyn Error + 'static)) -> Option<Self> {
        let mut frames = Vec::new();
        let mut source = err.source();
        while let Some(err) = source {
            frames.push(format!("caused by: {err}"));
            source = err.source();
        }
        (!frames.is_empty()).then_some(Self { frames })
    }

    /// Returns the frames.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

impl fmt::Display for TraceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{frame}")?;
        }
        Ok(())
    }
}

/// Details about why an attempt did not pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FailureDetail {
    kind: FailureKind,
    message: String,
    location: Option<TraceLocation>,
}

impl FailureDetail {
    /// Creates a new failure detail without a location.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    /// Sets the location.
    pub fn with_location(mut self, location: Option<TraceLocation>) -> Self {
        self.location = location;
        self
    }

    /// Returns the kind of this failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the location, if known.
    pub fn location(&self) -> Option<&TraceLocation> {
        self.location.as_ref()
    }
}

/// The four diagnostic text streams attached to a record.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Debug trace output.
    pub debug_trace: String,

    /// Messages written to the test context.
    pub context_messages: String,
}

impl Diagnostics {
    /// Returns true if all four streams are empty.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
            && self.stderr.is_empty()
            && self.debug_trace.is_empty()
            && self.context_messages.is_empty()
    }

    /// Returns these diagnostics with `prefix` prepended to each stream.
    pub fn prefixed_with(self, prefix: &Diagnostics) -> Self {
        fn join(prefix: &str, rest: String) -> String {
            if prefix.is_empty() {
                return rest;
            }
            let mut out = String::with_capacity(prefix.len() + rest.len());
            out.push_str(prefix);
            out.push_str(&rest);
            out
        }

        Self {
            stdout: join(&prefix.stdout, self.stdout),
            stderr: join(&prefix.stderr, self.stderr),
            debug_trace: join(&prefix.debug_trace, self.debug_trace),
            context_messages: join(&prefix.context_messages, self.context_messages),
        }
    }
}

/// A raw result, as produced by an executor for one attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResult {
    /// The outcome of this attempt.
    pub outcome: UnitOutcome,

    /// Why this attempt did not pass, if it didn't.
    pub failure: Option<FailureDetail>,

    /// Captured diagnostics for this attempt.
    pub diagnostics: Diagnostics,

    /// How long the attempt took.
    pub duration: Duration,

    /// The display name of this attempt, for data-driven iterations.
    pub display_name: Option<String>,

    /// The index of the data row this attempt ran with, for data-driven iterations.
    pub data_row_index: Option<usize>,

    /// Files attached to the result by the test body.
    pub result_files: Vec<Utf8PathBuf>,
}

impl RawResult {
    /// Creates a new raw result with the given outcome and nothing else.
    pub fn new(outcome: UnitOutcome) -> Self {
        Self {
            outcome,
            failure: None,
            diagnostics: Diagnostics::default(),
            duration: Duration::ZERO,
            display_name: None,
            data_row_index: None,
            result_files: Vec::new(),
        }
    }

    /// Creates a raw result for a failed attempt.
    pub fn failed(outcome: UnitOutcome, failure: FailureDetail) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(outcome)
        }
    }

    /// Sets standard output.
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.diagnostics.stdout = stdout.into();
        self
    }

    /// Sets standard error.
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.diagnostics.stderr = stderr.into();
        self
    }

    /// Sets the duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Marks this result as a data-driven iteration.
    pub fn with_data_row(mut self, index: usize, display_name: impl Into<String>) -> Self {
        self.data_row_index = Some(index);
        self.display_name = Some(display_name.into());
        self
    }
}

/// The normalized outcome of one execution attempt.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultRecord {
    outcome: UnitOutcome,
    failure: Option<FailureDetail>,
    diagnostics: Diagnostics,
    duration: Duration,
    display_name: Option<String>,
    data_row_index: Option<usize>,
    result_files: Vec<Utf8PathBuf>,
}

impl ResultRecord {
    pub(crate) fn from_raw(raw: RawResult, map_inconclusive_to_failed: bool) -> Self {
        let outcome = match raw.outcome {
            UnitOutcome::Inconclusive if map_inconclusive_to_failed => UnitOutcome::Failed,
            other => other,
        };
        Self {
            outcome,
            failure: raw.failure,
            diagnostics: raw.diagnostics,
            duration: raw.duration,
            display_name: raw.display_name,
            data_row_index: raw.data_row_index,
            result_files: raw.result_files,
        }
    }

    pub(crate) fn ignored(message: Option<String>) -> Self {
        Self {
            failure: message.map(|message| FailureDetail::new(FailureKind::Ignored, message)),
            ..Self::from_raw(RawResult::new(UnitOutcome::Ignored), false)
        }
    }

    /// Builds a record out of a failure, keeping the diagnostics and duration of `self`.
    pub(crate) fn merge_failure(&self, outcome: UnitOutcome, failure: FailureDetail) -> Self {
        Self {
            diagnostics: self.diagnostics.clone(),
            duration: self.duration,
            ..Self::from_raw(RawResult::failed(outcome, failure), false)
        }
    }

    pub(crate) fn prefix_diagnostics(&mut self, prefix: &Diagnostics) {
        self.diagnostics = std::mem::take(&mut self.diagnostics).prefixed_with(prefix);
    }

    /// Returns the outcome.
    pub fn outcome(&self) -> UnitOutcome {
        self.outcome
    }

    /// Returns the failure detail, if any.
    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }

    /// Returns all four diagnostic streams.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Returns standard output.
    pub fn stdout(&self) -> &str {
        &self.diagnostics.stdout
    }

    /// Returns standard error.
    pub fn stderr(&self) -> &str {
        &self.diagnostics.stderr
    }

    /// Returns the debug trace.
    pub fn debug_trace(&self) -> &str {
        &self.diagnostics.debug_trace
    }

    /// Returns messages written to the test context.
    pub fn context_messages(&self) -> &str {
        &self.diagnostics.context_messages
    }

    /// Returns how long the attempt took.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the display name, for data-driven iterations.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the data row index, for data-driven iterations.
    pub fn data_row_index(&self) -> Option<usize> {
        self.data_row_index
    }

    /// Returns the files attached to this result.
    pub fn result_files(&self) -> &[Utf8PathBuf] {
        &self.result_files
    }
}

/// The ordered results of executing one test unit.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UnitResults {
    /// This is guaranteed to be non-empty.
    records: Vec<ResultRecord>,
    start_time: DateTime<Local>,
    time_taken: Duration,
}

#[allow(clippy::len_without_is_empty)] // UnitResults is never empty
impl UnitResults {
    /// Returns `None` if `records` is empty.
    pub(crate) fn new(
        records: Vec<ResultRecord>,
        start_time: DateTime<Local>,
        time_taken: Duration,
    ) -> Option<Self> {
        (!records.is_empty()).then_some(Self {
            records,
            start_time,
            time_taken,
        })
    }

    /// Returns the time at which execution of the unit started.
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Returns how long execution of the unit took, including initialization.
    pub fn time_taken(&self) -> Duration {
        self.time_taken
    }

    /// Returns the first record, which carries initialization diagnostics.
    pub fn first(&self) -> &ResultRecord {
        &self.records[0]
    }

    /// Returns the last record.
    pub fn last(&self) -> &ResultRecord {
        &self.records[self.records.len() - 1]
    }

    /// Iterates over all records in order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'_ ResultRecord> + '_ {
        self.records.iter()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns the aggregate outcome over all records.
    pub fn aggregate_outcome(&self) -> UnitOutcome {
        aggregate_outcomes(self.records.iter().map(|record| record.outcome))
            .unwrap_or(UnitOutcome::Unknown)
    }

    /// Consumes self, returning the records.
    pub fn into_records(self) -> Vec<ResultRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a UnitResults {
    type Item = &'a ResultRecord;
    type IntoIter = std::slice::Iter<'a, ResultRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
