// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembly- and class-level initialization.
//!
//! Both hooks run inside a single diagnostic capture session. Whatever they
//! print, and whatever they write to the test context, is returned to the
//! runner along with the hooks' result, so it can be attached to the first
//! result record even if initialization failed.

use crate::{
    capture::{CaptureRequest, CaptureSession, DiagnosticCapture},
    context::SharedContext,
    errors::{CaptureError, TestFailure, UnitFailure, panic_message},
    helpers::call_guarded,
    record::Diagnostics,
    unit::TestUnit,
};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use tracing::debug;

/// One-time setup code scoped to an assembly or a class.
pub trait LifecycleHooks: Send + Sync {
    /// Runs assembly-level initialization for the unit's assembly.
    fn run_assembly_init(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure>;

    /// Runs class-level initialization for the unit's class.
    fn run_class_init(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure>;
}

/// [`LifecycleHooks`] that do nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {
    fn run_assembly_init(
        &self,
        _unit: &TestUnit,
        _context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure> {
        Ok(())
    }

    fn run_class_init(
        &self,
        _unit: &TestUnit,
        _context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure> {
        Ok(())
    }
}

/// The stage of initialization a failure happened in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LifecycleStage {
    /// Assembly-level initialization.
    AssemblyInit,

    /// Class-level initialization.
    ClassInit,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssemblyInit => write!(f, "assembly initialization"),
            Self::ClassInit => write!(f, "class initialization"),
        }
    }
}

/// The result of running initialization hooks.
#[derive(Debug)]
pub struct InitReport {
    /// Everything captured while the hooks ran, plus test context messages.
    pub diagnostics: Diagnostics,

    /// The hooks' result. On failure, the class hook may not have run.
    pub result: Result<(), UnitFailure>,
}

/// Runs lifecycle hooks inside a capture window.
#[derive(Clone, Copy)]
pub struct LifecycleRunner<'a> {
    hooks: &'a dyn LifecycleHooks,
    capture: &'a dyn DiagnosticCapture,
    capture_trace: bool,
    catch_panics: bool,
}

impl<'a> LifecycleRunner<'a> {
    /// Creates a new lifecycle runner.
    pub fn new(
        hooks: &'a dyn LifecycleHooks,
        capture: &'a dyn DiagnosticCapture,
        capture_trace: bool,
        catch_panics: bool,
    ) -> Self {
        Self {
            hooks,
            capture,
            capture_trace,
            catch_panics,
        }
    }

    /// Runs assembly initialization, then class initialization.
    ///
    /// Returns an error only if the capture session couldn't be opened; hook
    /// failures are reported through [`InitReport::result`].
    pub fn initialize(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<InitReport, CaptureError> {
        let session = CaptureSession::open(
            self.capture,
            CaptureRequest {
                trace: self.capture_trace,
            },
        )?;
        let result = self.run_hooks(unit, context);
        let output = session.close();

        let diagnostics = Diagnostics {
            stdout: output.stdout,
            stderr: output.stderr,
            debug_trace: output.trace,
            context_messages: context.take_messages(),
        };
        Ok(InitReport {
            diagnostics,
            result,
        })
    }

    fn run_hooks(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure> {
        debug!(test = %unit, "running assembly initialization");
        call_guarded(self.catch_panics, || {
            self.hooks.run_assembly_init(unit, context)
        })
        .map_err(|failure| {
            failure.with_context(format!(
                "{} for `{}` failed",
                LifecycleStage::AssemblyInit,
                unit.assembly()
            ))
        })?;

        debug!(test = %unit, "running class initialization");
        call_guarded(self.catch_panics, || self.hooks.run_class_init(unit, context)).map_err(
            |failure| {
                failure.with_context(format!(
                    "{} for `{}` failed",
                    LifecycleStage::ClassInit,
                    unit.class_name()
                ))
            },
        )
    }
}

/// Wraps [`LifecycleHooks`] so that each assembly and class is initialized at most once.
///
/// Later units in the same scope see the original outcome again: if
/// initialization failed or panicked, every later unit fails with the same
/// message without the hook being re-run. Concurrent callers for the same
/// scope wait for the first one to finish.
///
/// A panicking hook is resumed for the caller that ran it, so the runner's
/// `catch-panics` setting still decides whether it escapes.
pub struct OnceHooks<H> {
    inner: H,
    assemblies: Mutex<HashMap<String, Arc<OnceLock<Result<(), StoredFailure>>>>>,
    classes: Mutex<HashMap<(String, String), Arc<OnceLock<Result<(), StoredFailure>>>>>,
}

#[derive(Clone, Debug)]
struct StoredFailure {
    test_failure: Option<TestFailure>,
    message: String,
}

impl StoredFailure {
    fn new(failure: &UnitFailure) -> Self {
        Self {
            test_failure: failure.test_failure().cloned(),
            message: failure.to_string(),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        match payload.downcast_ref::<TestFailure>() {
            Some(test_failure) => Self {
                test_failure: Some(test_failure.clone()),
                message: test_failure.to_string(),
            },
            None => Self {
                test_failure: None,
                message: format!("panicked: {}", panic_message(payload)),
            },
        }
    }

    fn replay(&self) -> UnitFailure {
        match &self.test_failure {
            Some(test_failure) => UnitFailure::from(test_failure.clone()),
            None => UnitFailure::msg(self.message.clone()),
        }
    }
}

enum FreshFailure {
    Failed(UnitFailure),
    Panicked(Box<dyn Any + Send>),
}

impl<H: LifecycleHooks> OnceHooks<H> {
    /// Creates a new wrapper around `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            assemblies: Mutex::new(HashMap::new()),
            classes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the wrapped hooks.
    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn run_once<K: Eq + std::hash::Hash>(
        map: &Mutex<HashMap<K, Arc<OnceLock<Result<(), StoredFailure>>>>>,
        key: K,
        f: impl FnOnce() -> Result<(), UnitFailure>,
    ) -> Result<(), UnitFailure> {
        let cell = map
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();

        let mut fresh = None;
        let stored = cell.get_or_init(|| match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(failure)) => {
                let stored = StoredFailure::new(&failure);
                fresh = Some(FreshFailure::Failed(failure));
                Err(stored)
            }
            Err(payload) => {
                let stored = StoredFailure::from_panic(&*payload);
                fresh = Some(FreshFailure::Panicked(payload));
                Err(stored)
            }
        });
        // The caller that actually ran the hook gets the original failure.
        match fresh {
            Some(FreshFailure::Failed(failure)) => Err(failure),
            Some(FreshFailure::Panicked(payload)) => panic::resume_unwind(payload),
            None => stored.as_ref().map_err(StoredFailure::replay).copied(),
        }
    }
}

impl<H: LifecycleHooks> LifecycleHooks for OnceHooks<H> {
    fn run_assembly_init(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure> {
        Self::run_once(&self.assemblies, unit.assembly().to_owned(), || {
            self.inner.run_assembly_init(unit, context)
        })
    }

    fn run_class_init(
        &self,
        unit: &TestUnit,
        context: &mut dyn SharedContext,
    ) -> Result<(), UnitFailure> {
        let key = (unit.assembly().to_owned(), unit.class_name().to_owned());
        Self::run_once(&self.classes, key, || {
            self.inner.run_class_init(unit, context)
        })
    }
}

impl<H: fmt::Debug> fmt::Debug for OnceHooks<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceHooks")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}
