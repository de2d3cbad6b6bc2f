// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ignore markers on test classes and methods.

use crate::{errors::InspectError, unit::TestUnit};
use std::fmt;

/// Something an ignore marker can be attached to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MarkerTarget<'a> {
    /// The class declaring the test method.
    Class {
        /// The assembly owning the class.
        assembly: &'a str,

        /// The class name.
        class_name: &'a str,
    },

    /// The test method itself.
    Method {
        /// The class declaring the method.
        class_name: &'a str,

        /// The method name.
        method_name: &'a str,
    },
}

impl<'a> MarkerTarget<'a> {
    /// Returns the class target for a test unit.
    pub fn class_of(unit: &'a TestUnit) -> Self {
        Self::Class {
            assembly: unit.assembly(),
            class_name: unit.class_name(),
        }
    }

    /// Returns the method target for a test unit.
    pub fn method_of(unit: &'a TestUnit) -> Self {
        Self::Method {
            class_name: unit.class_name(),
            method_name: unit.method_name(),
        }
    }
}

impl fmt::Display for MarkerTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class { class_name, .. } => write!(f, "class `{class_name}`"),
            Self::Method {
                class_name,
                method_name,
            } => write!(f, "method `{class_name}::{method_name}`"),
        }
    }
}

/// Answers questions about the markers attached to test code.
///
/// Implemented by hosts on top of whatever reflection or metadata their
/// ecosystem provides.
pub trait AttributeInspector: Send + Sync {
    /// Returns true if the target carries an ignore marker.
    fn is_ignored(&self, target: MarkerTarget<'_>) -> Result<bool, InspectError>;

    /// Returns the message associated with the target's ignore marker, if any.
    fn ignore_message(&self, target: MarkerTarget<'_>) -> Result<Option<String>, InspectError>;
}

/// An [`AttributeInspector`] that reports nothing as ignored.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoMarkers;

impl AttributeInspector for NoMarkers {
    fn is_ignored(&self, _target: MarkerTarget<'_>) -> Result<bool, InspectError> {
        Ok(false)
    }

    fn ignore_message(&self, _target: MarkerTarget<'_>) -> Result<Option<String>, InspectError> {
        Ok(None)
    }
}

/// The result of resolving ignore markers for a test unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IgnoreStatus {
    /// The resolved message. May be empty or absent.
    pub message: Option<String>,
}

/// Determines whether a test unit is ignored, and with which message.
///
/// The class marker is checked first. The method's message is used if the
/// class isn't ignored or its message is empty.
pub fn resolve_ignore(
    inspector: &dyn AttributeInspector,
    unit: &TestUnit,
) -> Result<Option<IgnoreStatus>, InspectError> {
    let class = MarkerTarget::class_of(unit);
    let method = MarkerTarget::method_of(unit);

    let class_ignored = inspector.is_ignored(class)?;
    let method_ignored = inspector.is_ignored(method)?;

    let mut message = None;
    if class_ignored {
        message = inspector.ignore_message(class)?;
    }
    if method_ignored && message.as_deref().is_none_or(str::is_empty) {
        message = inspector.ignore_message(method)?;
    }

    Ok((class_ignored || method_ignored).then_some(IgnoreStatus { message }))
}
