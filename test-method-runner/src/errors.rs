// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the test method runner.

use crate::{
    outcome::UnitOutcome,
    record::{FailureDetail, FailureKind, TraceLocation},
};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{any::Any, error::Error, fmt};
use thiserror::Error;

/// A boxed error returned by a collaborator.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// An error that occurred while parsing the runner config.
#[derive(Debug, Error)]
#[error(
    "failed to parse runner config{}",
    .config_file.as_ref().map(|file| format!(" at `{file}`")).unwrap_or_default()
)]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Option<Utf8PathBuf>,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: Option<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self { config_file, kind }
    }

    /// Returns the config file for this error, or `None` if the config didn't come from a file.
    pub fn config_file(&self) -> Option<&Utf8PathBuf> {
        self.config_file.as_ref()
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while acquiring a diagnostic capture session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// Another capture session is still active on the same capture.
    #[error("a diagnostic capture session is already active")]
    AlreadyActive,

    /// The underlying capture mechanism failed.
    #[error("failed to acquire diagnostic capture")]
    Acquire(#[source] BoxError),
}

/// An error returned by an [`AttributeInspector`](crate::attributes::AttributeInspector).
#[derive(Debug, Error)]
#[error("failed to inspect ignore markers on {target}")]
pub struct InspectError {
    target: String,
    #[source]
    err: BoxError,
}

impl InspectError {
    /// Creates a new `InspectError` for the given target.
    pub fn new(target: impl Into<String>, err: impl Into<BoxError>) -> Self {
        Self {
            target: target.into(),
            err: err.into(),
        }
    }
}

/// An error returned by [`TestMethodRunner::execute`](crate::runner::TestMethodRunner::execute).
///
/// Test failures never show up here: they are turned into result records. This
/// type only represents defects in collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// The attribute inspector failed.
    #[error("error checking ignore status of `{unit}`")]
    Inspect {
        /// The test unit being executed.
        unit: String,

        /// The underlying error.
        #[source]
        err: InspectError,
    },

    /// A diagnostic capture session could not be opened.
    #[error("error opening diagnostic capture for `{unit}`")]
    Capture {
        /// The test unit being executed.
        unit: String,

        /// The underlying error.
        #[source]
        err: CaptureError,
    },

    /// Execution finished without any result records.
    #[error("execution of `{unit}` produced no result records")]
    NoResults {
        /// The test unit being executed.
        unit: String,
    },
}

/// A failure carrying its own outcome, recognized specially by the runner.
///
/// Hooks, executors and data sources can return (or panic with) this type to
/// control the outcome and failure kind of the resulting record. Any other
/// error is reported as [`UnitOutcome::Error`].
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct TestFailure {
    outcome: UnitOutcome,
    kind: FailureKind,
    message: String,
    location: Option<TraceLocation>,
}

impl TestFailure {
    /// Creates a new failure with the given outcome and kind, located at the caller.
    #[track_caller]
    pub fn new(outcome: UnitOutcome, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            outcome,
            kind,
            message: message.into(),
            location: Some(TraceLocation::caller()),
        }
    }

    /// Creates a failed expectation.
    #[track_caller]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(UnitOutcome::Failed, FailureKind::AssertionFailure, message)
    }

    /// Creates an inconclusive result.
    #[track_caller]
    pub fn inconclusive(message: impl Into<String>) -> Self {
        Self::new(
            UnitOutcome::Inconclusive,
            FailureKind::AssertionFailure,
            message,
        )
    }

    /// Replaces the location of this failure.
    pub fn with_location(mut self, location: Option<TraceLocation>) -> Self {
        self.location = location;
        self
    }

    /// Returns the outcome carried by this failure.
    pub fn outcome(&self) -> UnitOutcome {
        self.outcome
    }

    /// Returns the failure kind carried by this failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the location, if any.
    pub fn location(&self) -> Option<&TraceLocation> {
        self.location.as_ref()
    }
}

/// A failure raised by a lifecycle hook, executor or data source.
///
/// Any error type converts into this with `?`. Panics caught by the runner are
/// also represented this way.
#[derive(Debug)]
pub struct UnitFailure {
    repr: FailureRepr,
    context: Option<String>,
}

#[derive(Debug)]
enum FailureRepr {
    Error(BoxError),
    Panic { message: String },
}

impl UnitFailure {
    /// Creates a failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::from_boxed(message.into())
    }

    /// Creates a failure from a boxed error.
    pub fn from_boxed(err: BoxError) -> Self {
        Self {
            repr: FailureRepr::Error(err),
            context: None,
        }
    }

    /// Creates a failure from a caught panic payload.
    ///
    /// Payloads of type [`TestFailure`] are preserved; string payloads become the message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<TestFailure>() {
            Ok(failure) => return Self::from_boxed(failure),
            Err(payload) => payload,
        };
        Self {
            repr: FailureRepr::Panic {
                message: panic_message(&*payload),
            },
            context: None,
        }
    }

    /// Adds a context message, displayed before the underlying message.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = Some(match self.context.take() {
            Some(existing) => format!("{context}: {existing}"),
            None => context,
        });
        self
    }

    /// Returns the recognized test failure, if this failure carries one.
    pub fn test_failure(&self) -> Option<&TestFailure> {
        match &self.repr {
            FailureRepr::Error(err) => err.downcast_ref::<TestFailure>(),
            FailureRepr::Panic { .. } => None,
        }
    }

    /// Returns true if this failure came from a caught panic.
    pub fn is_panic(&self) -> bool {
        matches!(self.repr, FailureRepr::Panic { .. })
    }

    /// Resolves this failure into the outcome and failure detail of a record.
    pub(crate) fn resolve(&self) -> (UnitOutcome, FailureDetail) {
        let message = self.to_string();
        match (&self.repr, self.test_failure()) {
            (_, Some(failure)) => (
                failure.outcome(),
                FailureDetail::new(failure.kind(), message)
                    .with_location(failure.location().cloned()),
            ),
            (FailureRepr::Error(err), None) => (
                UnitOutcome::Error,
                FailureDetail::new(FailureKind::Error, message)
                    .with_location(TraceLocation::from_error_sources(err.as_ref())),
            ),
            (FailureRepr::Panic { .. }, None) => (
                UnitOutcome::Error,
                FailureDetail::new(FailureKind::Error, message),
            ),
        }
    }
}

/// Returns the message carried by a non-[`TestFailure`] panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload of unknown type".to_owned()
    }
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{context}: ")?;
        }
        match &self.repr {
            FailureRepr::Error(err) => write!(f, "{err}"),
            FailureRepr::Panic { message } => write!(f, "panicked: {message}"),
        }
    }
}

impl<E> From<E> for UnitFailure
where
    E: Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::from_boxed(Box::new(err))
    }
}

/// Displays an error along with its chain of sources.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}
