// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifies a resolved test unit and its execution options.

use crate::executor::Executor;
use debug_ignore::DebugIgnore;
use smol_str::SmolStr;
use std::{fmt, sync::Arc, time::Duration};

/// One discovered test method plus its resolved execution options.
///
/// Test units are created by the host and are read-only to the runner.
#[derive(Clone, Debug)]
pub struct TestUnit {
    assembly: SmolStr,
    class_name: SmolStr,
    method_name: SmolStr,
    options: TestUnitOptions,
}

impl TestUnit {
    /// Creates a new test unit with default options.
    pub fn new(
        assembly: impl Into<SmolStr>,
        class_name: impl Into<SmolStr>,
        method_name: impl Into<SmolStr>,
    ) -> Self {
        Self {
            assembly: assembly.into(),
            class_name: class_name.into(),
            method_name: method_name.into(),
            options: TestUnitOptions::default(),
        }
    }

    /// Sets the execution options.
    pub fn with_options(mut self, options: TestUnitOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the assembly (or crate, or module) that owns the test class.
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Returns the name of the declaring class.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the name of the test method.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns the execution options.
    pub fn options(&self) -> &TestUnitOptions {
        &self.options
    }
}

impl fmt::Display for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class_name, self.method_name)
    }
}

/// Options controlling how a test unit is executed.
#[derive(Clone, Debug, Default)]
pub struct TestUnitOptions {
    executor: Option<DebugIgnore<Arc<dyn Executor>>>,
    capture_debug_traces: bool,
    timeout: Option<Duration>,
}

impl TestUnitOptions {
    /// Creates options with no executor configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the executor used to run the test body.
    pub fn set_executor(&mut self, executor: Arc<dyn Executor>) -> &mut Self {
        self.executor = Some(DebugIgnore(executor));
        self
    }

    /// Requests capture of the debug trace stream.
    pub fn set_capture_debug_traces(&mut self, capture_debug_traces: bool) -> &mut Self {
        self.capture_debug_traces = capture_debug_traces;
        self
    }

    /// Sets the timeout passed on to the executor.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the configured executor, if any.
    pub fn executor(&self) -> Option<&Arc<dyn Executor>> {
        self.executor.as_ref().map(|executor| &executor.0)
    }

    /// Returns true if debug-trace capture was requested.
    pub fn capture_debug_traces(&self) -> bool {
        self.capture_debug_traces
    }

    /// Returns the timeout the executor should apply, if any.
    ///
    /// The runner never enforces this itself.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
