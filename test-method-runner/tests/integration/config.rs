// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, panic::AssertUnwindSafe};
use test_method_runner::{
    config::{ConfigWarnings, RunnerConfig},
    context::{SharedContext, TestContext},
    errors::ConfigParseErrorKind,
    outcome::UnitOutcome,
    runner::TestMethodRunnerBuilder,
};

#[derive(Default)]
struct CollectWarnings {
    unknown: Vec<String>,
}

impl ConfigWarnings for CollectWarnings {
    fn unknown_config_keys(
        &mut self,
        _config_file: Option<&Utf8Path>,
        unknown: &BTreeSet<String>,
    ) {
        self.unknown.extend(unknown.iter().cloned());
    }
}

#[test]
fn config_file_is_layered_over_defaults() -> Result<()> {
    test_init();

    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("runner.toml");
    std::fs::write(
        &path,
        indoc! {r#"
            [runner]
            map-inconclusive-to-failed = true
            missing-result-message = "the test body returned nothing"
            parallel = true
        "#},
    )?;

    let mut warnings = CollectWarnings::default();
    let config = RunnerConfig::from_sources_with_warnings(Some(path.as_path()), &mut warnings)?;
    assert!(config.map_inconclusive_to_failed());
    assert!(config.catch_panics());
    assert_eq!(warnings.unknown, vec!["runner.parallel".to_owned()]);

    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_config(config);
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(
        &unit_with(FixedExecutor::new(&[UnitOutcome::Inconclusive], "")),
        &mut context,
    )?;
    assert_eq!(results.first().outcome(), UnitOutcome::Failed);
    assert_eq!(context.outcome(), Some(UnitOutcome::Failed));

    let results = runner.execute(&unit_with(FixedExecutor::new(&[], "")), &mut context)?;
    assert_eq!(
        results.first().failure().map(|f| f.message()),
        Some("the test body returned nothing")
    );
    Ok(())
}

#[test]
fn missing_config_file() -> Result<()> {
    test_init();

    let dir = Utf8TempDir::new()?;
    let path = dir.path().join("does-not-exist.toml");
    let err = RunnerConfig::from_sources(Some(path.as_path())).expect_err("file is missing");
    assert_eq!(err.config_file(), Some(&path));
    assert!(
        matches!(err.kind(), ConfigParseErrorKind::BuildError(_)),
        "got {:?}",
        err.kind()
    );
    Ok(())
}

#[test]
fn no_config_file_uses_defaults() -> Result<()> {
    test_init();

    assert_eq!(RunnerConfig::from_sources(None)?, RunnerConfig::default());
    Ok(())
}

#[test]
fn uncaught_panics_propagate() {
    test_init();

    let mut config = RunnerConfig::default();
    config.set_catch_panics(false);
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_config(config);
    let runner = builder.build();

    let panicking = test_method_runner::executor::from_fn(|_, _| panic!("body exploded"));
    let unit = unit_with(panicking);
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let mut context = TestContext::new();
        runner.execute(&unit, &mut context)
    }));
    assert!(result.is_err(), "panic escaped execute");
}
