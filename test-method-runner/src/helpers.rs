// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for the runner.

use crate::errors::UnitFailure;
use std::panic::{self, AssertUnwindSafe};

/// Calls into a collaborator, turning a panic into a [`UnitFailure`] if `catch_panics` is set.
pub(crate) fn call_guarded<T>(
    catch_panics: bool,
    f: impl FnOnce() -> Result<T, UnitFailure>,
) -> Result<T, UnitFailure> {
    if !catch_panics {
        return f();
    }
    // The collaborator's state is not observed again after a panic, apart from
    // through the failure it produced.
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(UnitFailure::from_panic(payload))
    })
}
