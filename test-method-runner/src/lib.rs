// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Execution of a single resolved test unit.
//!
//! The main entry point is [`runner::TestMethodRunner`]. Given a
//! [`unit::TestUnit`], it checks ignore markers, runs assembly- and class-level
//! initialization inside a diagnostic capture window, delegates the test body
//! to an [`executor::Executor`] (or a data-driven [`executor::DataSource`]),
//! aggregates the outcomes and returns a non-empty list of
//! [`record::ResultRecord`]s.
//!
//! Everything the runner talks to is a trait object handed in by the host, so
//! discovery, reflection and the concrete invocation mechanism stay outside this
//! crate.

pub mod attributes;
pub mod capture;
pub mod config;
pub mod context;
pub mod errors;
pub mod executor;
mod helpers;
pub mod lifecycle;
pub mod outcome;
pub mod record;
pub mod runner;
mod time;
pub mod unit;
