// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The context shared between lifecycle hooks, executors and the runner.

use crate::outcome::UnitOutcome;
use indexmap::IndexMap;
use swrite::{SWrite, swriteln};

/// A context object shared by everything that takes part in running one test unit.
///
/// Hooks may read and write it; the runner reports the aggregate outcome to it
/// and drains the messages written during initialization.
pub trait SharedContext {
    /// Records the aggregate outcome of the test unit.
    fn set_outcome(&mut self, outcome: UnitOutcome);

    /// Returns the outcome recorded with [`Self::set_outcome`], if any.
    fn outcome(&self) -> Option<UnitOutcome>;

    /// Appends a diagnostic message.
    fn write_message(&mut self, message: &str);

    /// Returns all diagnostic messages written so far and clears them.
    fn take_messages(&mut self) -> String;

    /// Returns a property set by a hook or the host.
    fn property(&self, key: &str) -> Option<&str>;

    /// Sets a property, returning the previous value.
    fn set_property(&mut self, key: &str, value: String) -> Option<String>;
}

/// The default [`SharedContext`].
///
/// Messages are stored line by line and joined with newlines when taken.
#[derive(Clone, Debug, Default)]
pub struct TestContext {
    outcome: Option<UnitOutcome>,
    messages: Vec<String>,
    properties: IndexMap<String, String>,
}

impl TestContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates over all properties in insertion order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.properties
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl SharedContext for TestContext {
    fn set_outcome(&mut self, outcome: UnitOutcome) {
        self.outcome = Some(outcome);
    }

    fn outcome(&self) -> Option<UnitOutcome> {
        self.outcome
    }

    fn write_message(&mut self, message: &str) {
        self.messages.push(message.to_owned());
    }

    fn take_messages(&mut self) -> String {
        let mut out = String::new();
        for message in self.messages.drain(..) {
            swriteln!(out, "{message}");
        }
        out
    }

    fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    fn set_property(&mut self, key: &str, value: String) -> Option<String> {
        self.properties.insert(key.to_owned(), value)
    }
}
