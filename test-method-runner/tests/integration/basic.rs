// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use pretty_assertions::assert_eq;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};
use test_case::test_case;
use test_method_runner::{
    capture::BufferCapture,
    context::{SharedContext, TestContext},
    errors::{TestFailure, UnitFailure},
    executor::from_fn,
    lifecycle::{LifecycleHooks, OnceHooks},
    outcome::UnitOutcome,
    record::{FailureKind, RawResult},
    runner::TestMethodRunnerBuilder,
    unit::{TestUnit, TestUnitOptions},
};

#[test]
fn class_ignore_skips_everything() -> Result<()> {
    test_init();

    let capture = Arc::new(BufferCapture::new());
    let hooks = Arc::new(PrintingHooks::new(&capture));
    let executor = FixedExecutor::new(&[UnitOutcome::Passed], "A");

    let mut builder = TestMethodRunnerBuilder::default();
    builder
        .set_inspector(Arc::new(
            MarkerTable::default().ignore_class("CalculatorTests", Some("flaky on CI")),
        ))
        .set_hooks(hooks.clone())
        .set_capture(capture);
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(&unit_with(executor.clone()), &mut context)?;

    assert_eq!(results.len(), 1);
    let record = results.first();
    assert_eq!(record.outcome(), UnitOutcome::Ignored);
    let failure = record.failure().expect("ignore message is attached");
    assert_eq!(failure.kind(), FailureKind::Ignored);
    assert_eq!(failure.message(), "flaky on CI");
    assert!(record.diagnostics().is_empty());

    assert_eq!(hooks.calls(), 0, "no lifecycle hooks ran");
    assert_eq!(executor.calls(), 0, "executor didn't run");
    assert_eq!(context.outcome(), None);
    Ok(())
}

#[test_case(None, Some("method reason"), Some("method reason") ; "class has no message")]
#[test_case(Some(""), Some("method reason"), Some("method reason") ; "class message is empty")]
#[test_case(Some("class reason"), Some("method reason"), Some("class reason") ; "class message wins")]
fn method_ignore_message(
    class_message: Option<&str>,
    method_message: Option<&str>,
    expected: Option<&str>,
) -> Result<()> {
    test_init();

    let markers = MarkerTable::default()
        .ignore_class("CalculatorTests", class_message)
        .ignore_method("CalculatorTests", "adds_numbers", method_message);
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_inspector(Arc::new(markers));
    let runner = builder.build();

    let executor = FixedExecutor::new(&[UnitOutcome::Passed], "A");
    let mut context = TestContext::new();
    let results = runner.execute(&unit_with(executor), &mut context)?;
    assert_eq!(results.len(), 1);
    assert_eq!(results.first().outcome(), UnitOutcome::Ignored);
    assert_eq!(
        results.first().failure().map(|failure| failure.message()),
        expected
    );
    Ok(())
}

#[test]
fn only_method_ignored() -> Result<()> {
    test_init();

    let markers = MarkerTable::default().ignore_method(
        "CalculatorTests",
        "adds_numbers",
        Some("not implemented yet"),
    );
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_inspector(Arc::new(markers));
    let runner = builder.build();

    let mut context = TestContext::new();
    let ignored = runner.execute(
        &unit_with(FixedExecutor::new(&[UnitOutcome::Passed], "")),
        &mut context,
    )?;
    assert_eq!(
        ignored.first().failure().map(|failure| failure.message()),
        Some("not implemented yet")
    );

    // Other methods in the class still run.
    let other = TestUnit::new("sample.dll", "CalculatorTests", "subtracts_numbers");
    let results = runner.execute(&other, &mut context)?;
    assert_eq!(results.first().outcome(), UnitOutcome::Unknown);
    Ok(())
}

#[test]
fn end_to_end_single_execution() -> Result<()> {
    test_init();

    let capture = Arc::new(BufferCapture::new());
    let hooks = Arc::new(PrintingHooks::new(&capture));
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_hooks(hooks.clone()).set_capture(capture.clone());
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(
        &unit_with(FixedExecutor::new(&[UnitOutcome::Passed], "A")),
        &mut context,
    )?;

    assert_eq!(results.len(), 1);
    let record = results.first();
    assert_eq!(record.outcome(), UnitOutcome::Passed);
    assert_eq!(record.stdout(), "initA");
    assert_eq!(record.context_messages(), "assembly initialized\n");
    assert_eq!(record.failure(), None);
    assert_eq!(context.outcome(), Some(UnitOutcome::Passed));
    assert_eq!(hooks.calls(), 2);
    ensure!(!capture.is_active(), "capture session was released");
    ensure!(
        results.time_taken() >= record.duration(),
        "unit time includes the record's time"
    );
    Ok(())
}

#[test]
fn end_to_end_data_driven() -> Result<()> {
    test_init();

    let capture = Arc::new(BufferCapture::new());
    let mut builder = TestMethodRunnerBuilder::default();
    builder
        .set_hooks(Arc::new(PrintingHooks::new(&capture)))
        .set_capture(capture)
        .set_data_source(Arc::new(Rows::new(&[
            UnitOutcome::Passed,
            UnitOutcome::Failed,
            UnitOutcome::Passed,
        ])));
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(&unit_with(Rows::row_executor()), &mut context)?;

    assert_eq!(results.len(), 3);
    assert_eq!(context.outcome(), Some(UnitOutcome::Failed));
    assert_eq!(
        results.iter().map(|r| r.outcome()).collect::<Vec<_>>(),
        vec![UnitOutcome::Passed, UnitOutcome::Failed, UnitOutcome::Passed]
    );
    assert_eq!(
        results.iter().map(|r| r.data_row_index()).collect::<Vec<_>>(),
        vec![Some(0), Some(1), Some(2)]
    );
    assert_eq!(
        results.last().display_name(),
        Some("CalculatorTests::adds_numbers (row 2)")
    );

    // Only the first record carries the initialization output.
    let stdouts: Vec<_> = results.iter().map(|r| r.stdout()).collect();
    assert_eq!(stdouts, vec!["initrow", "row", "row"]);
    let messages: Vec<_> = results.iter().map(|r| r.context_messages()).collect();
    assert_eq!(messages, vec!["assembly initialized\n", "", ""]);
    Ok(())
}

#[test]
fn init_failure_becomes_last_record() -> Result<()> {
    test_init();

    let capture = Arc::new(BufferCapture::new());
    let hooks = Arc::new(PrintingHooks::new(&capture).failing_class("connection refused"));
    let executor = FixedExecutor::new(&[UnitOutcome::Passed], "A");
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_hooks(hooks.clone()).set_capture(capture.clone());
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(&unit_with(executor.clone()), &mut context)?;

    assert_eq!(results.len(), 1);
    let record = results.last();
    assert_eq!(record.outcome(), UnitOutcome::Error);
    let failure = record.failure().expect("init failure is recorded");
    assert_eq!(failure.kind(), FailureKind::Error);
    assert_eq!(
        failure.message(),
        "class initialization for `CalculatorTests` failed: connection refused"
    );

    // Captured initialization output is still reported.
    let first = results.first();
    assert_eq!(first.stdout(), "init");
    assert_eq!(first.stderr(), "class setup failed");
    assert_eq!(first.context_messages(), "assembly initialized\n");

    assert_eq!(executor.calls(), 0, "body is skipped");
    ensure!(!capture.is_active(), "capture session was released");
    Ok(())
}

#[test]
fn init_panic_with_test_failure() -> Result<()> {
    test_init();

    struct AssertingHooks;

    impl LifecycleHooks for AssertingHooks {
        fn run_assembly_init(
            &self,
            _unit: &TestUnit,
            _context: &mut dyn SharedContext,
        ) -> Result<(), UnitFailure> {
            std::panic::panic_any(TestFailure::assertion("expected 3 fixtures, found 2"))
        }

        fn run_class_init(
            &self,
            _unit: &TestUnit,
            _context: &mut dyn SharedContext,
        ) -> Result<(), UnitFailure> {
            unreachable!("class init runs only after assembly init succeeds")
        }
    }

    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_hooks(Arc::new(AssertingHooks));
    let runner = builder.build();

    let mut context = TestContext::new();
    let results = runner.execute(
        &unit_with(FixedExecutor::new(&[UnitOutcome::Passed], "A")),
        &mut context,
    )?;
    let record = results.last();
    assert_eq!(record.outcome(), UnitOutcome::Failed);
    let failure = record.failure().expect("failure is recorded");
    assert_eq!(failure.kind(), FailureKind::AssertionFailure);
    assert_eq!(
        failure.message(),
        "assembly initialization for `sample.dll` failed: expected 3 fixtures, found 2"
    );
    ensure!(failure.location().is_some(), "location is kept");
    Ok(())
}

#[test]
fn init_diagnostics_appear_once() -> Result<()> {
    test_init();

    let capture = Arc::new(BufferCapture::new());
    let mut builder = TestMethodRunnerBuilder::default();
    builder
        .set_hooks(Arc::new(PrintingHooks::new(&capture)))
        .set_capture(capture);
    let runner = builder.build();

    for outcomes in [
        &[UnitOutcome::Passed][..],
        &[UnitOutcome::Passed, UnitOutcome::Timeout],
        &[],
    ] {
        let mut context = TestContext::new();
        let results = runner.execute(
            &unit_with(FixedExecutor::new(outcomes, "body")),
            &mut context,
        )?;
        let total: usize = results
            .iter()
            .map(|r| r.stdout().matches("init").count())
            .sum();
        assert_eq!(total, 1, "init output appears once for {outcomes:?}");
        assert!(results.first().stdout().starts_with("init"));
    }
    Ok(())
}

#[test]
fn body_errors_are_contained() -> Result<()> {
    test_init();

    let runner = TestMethodRunnerBuilder::default().build();
    let mut context = TestContext::new();

    let failing = from_fn(|_, _| Err(std::io::Error::other("socket closed").into()));
    let results = runner.execute(&unit_with(failing), &mut context)?;
    let record = results.first();
    assert_eq!(record.outcome(), UnitOutcome::Error);
    assert_eq!(
        record.failure().map(|f| f.message()),
        Some("error executing test body: socket closed")
    );
    assert_eq!(context.outcome(), Some(UnitOutcome::Error));

    let panicking = from_fn(|_, _| panic!("index out of bounds"));
    let results = runner.execute(&unit_with(panicking), &mut context)?;
    assert_eq!(
        results.first().failure().map(|f| f.message()),
        Some("error executing test body: panicked: index out of bounds")
    );
    Ok(())
}

#[test]
fn once_hooks_across_threads() -> Result<()> {
    test_init();

    let capture = BufferCapture::new();
    let hooks = Arc::new(OnceHooks::new(PrintingHooks::new(&capture)));
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_hooks(hooks.clone());
    let runner = builder.build();

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|index| {
                let runner = &runner;
                scope.spawn(move || {
                    let unit =
                        TestUnit::new("sample.dll", "CalculatorTests", format!("case_{index}"));
                    let mut context = TestContext::new();
                    runner.execute(&unit, &mut context)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| -> Result<UnitOutcome> {
                let results = handle.join().expect("runner thread didn't panic")?;
                Ok(results.first().outcome())
            })
            .collect::<Result<Vec<_>>>()
    })?;

    // None of the units has an executor, so each reports a synthesized result.
    assert_eq!(outcomes, vec![UnitOutcome::Unknown; 4]);
    assert_eq!(hooks.inner().calls(), 2, "each hook ran once");
    Ok(())
}

#[test]
fn once_hooks_store_init_panics() -> Result<()> {
    test_init();

    struct PanickingAssembly {
        calls: AtomicUsize,
    }

    impl LifecycleHooks for PanickingAssembly {
        fn run_assembly_init(
            &self,
            _unit: &TestUnit,
            _context: &mut dyn SharedContext,
        ) -> Result<(), UnitFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("setup assert failed")
        }

        fn run_class_init(
            &self,
            _unit: &TestUnit,
            _context: &mut dyn SharedContext,
        ) -> Result<(), UnitFailure> {
            Ok(())
        }
    }

    let hooks = Arc::new(OnceHooks::new(PanickingAssembly {
        calls: AtomicUsize::new(0),
    }));
    let mut builder = TestMethodRunnerBuilder::default();
    builder.set_hooks(hooks.clone());
    let runner = builder.build();

    for method in ["a", "b", "c"] {
        let mut options = TestUnitOptions::new();
        options.set_executor(FixedExecutor::new(&[UnitOutcome::Passed], ""));
        let unit = TestUnit::new("asm", "Class", method).with_options(options);
        let mut context = TestContext::new();
        let results = runner.execute(&unit, &mut context)?;
        assert_eq!(results.len(), 1);
        let record = results.first();
        assert_eq!(record.outcome(), UnitOutcome::Error);
        assert_eq!(
            record.failure().map(|f| f.message()),
            Some("assembly initialization for `asm` failed: panicked: setup assert failed"),
            "unit {method}"
        );
    }
    assert_eq!(hooks.inner().calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn timeout_is_reported_by_executor() -> Result<()> {
    test_init();

    let executor = from_fn(|unit, _| {
        let limit = unit.options().timeout().unwrap_or(Duration::MAX);
        let elapsed = Duration::from_secs(5);
        let outcome = if elapsed > limit {
            UnitOutcome::Timeout
        } else {
            UnitOutcome::Passed
        };
        Ok(vec![RawResult::new(outcome).with_duration(elapsed)])
    });
    let mut options = TestUnitOptions::new();
    options
        .set_executor(executor)
        .set_timeout(Duration::from_secs(1));
    let unit = TestUnit::new("sample.dll", "CalculatorTests", "slow").with_options(options);

    let runner = TestMethodRunnerBuilder::default().build();
    let mut context = TestContext::new();
    let results = runner.execute(&unit, &mut context)?;
    assert_eq!(results.first().outcome(), UnitOutcome::Timeout);
    assert_eq!(results.first().duration(), Duration::from_secs(5));
    assert_eq!(context.outcome(), Some(UnitOutcome::Timeout));
    Ok(())
}
