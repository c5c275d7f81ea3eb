//! Executor integration tests
//!
//! Caching, single-flight execution, timeouts, tag selection and fault
//! isolation through the public API.

use std::time::Duration;

use vigil::health::{
    Executor, ExecutorSettings, LogLevel, ProbeDescriptor, ProbeResult, RunOptions, Status,
    TagFilter,
};

use crate::{create_test_executor, Behavior, TestProbe};

#[tokio::test(start_paused = true)]
async fn test_runs_within_ttl_share_one_execution() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::warn("disk 91% full"));
    executor
        .register(ProbeDescriptor::new("disk"), probe.clone())
        .unwrap();

    let first = executor.run("", None).await.unwrap();
    tokio::time::advance(Duration::from_millis(500)).await;
    let second = executor.run("", None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.status(), Status::Warn);
    assert_eq!(probe.executions(), 1);

    // After the TTL the probe runs again
    tokio::time::advance(Duration::from_secs(2)).await;
    executor.run("", None).await.unwrap();
    assert_eq!(probe.executions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_timeouts_share_slow_execution() {
    let executor = create_test_executor();
    let probe = TestProbe::slow(ProbeResult::ok("eventually fine"), Duration::from_secs(5));
    executor
        .register(ProbeDescriptor::new("slow"), probe.clone())
        .unwrap();

    let options = RunOptions::default().with_timeout(Duration::from_millis(100));
    let filter = TagFilter::all();
    let (a, b) = tokio::join!(
        executor.run_with(&filter, options),
        executor.run_with(&filter, options),
    );

    for report in [&a, &b] {
        let entry = report.get("slow").unwrap();
        assert_eq!(entry.status(), Status::Warn);
        assert!(entry.meta.timed_out);
    }
    assert_eq!(probe.executions(), 1);
    assert!(executor.records()[0].running);

    // The abandoned execution still lands in the cache
    tokio::time::sleep(Duration::from_secs(5)).await;
    let report = executor.run_all().await;
    assert_eq!(report.status(), Status::Ok);
    assert!(!report.get("slow").unwrap().meta.timed_out);
    assert_eq!(probe.executions(), 1);
    assert_eq!(executor.record("slow").unwrap().execution_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exceedingly_late_timeout_is_critical() {
    let executor = Executor::new(ExecutorSettings {
        exceedingly_late_threshold: Duration::from_secs(10),
        ..ExecutorSettings::default()
    });
    let probe = TestProbe::slow(ProbeResult::ok("never"), Duration::from_secs(3600));
    executor
        .register(
            ProbeDescriptor::new("stuck").with_timeout(Duration::from_secs(1)),
            probe.clone(),
        )
        .unwrap();

    assert_eq!(executor.run_all().await.status(), Status::Warn);
    tokio::time::advance(Duration::from_secs(15)).await;
    assert_eq!(executor.run_all().await.status(), Status::Critical);
    assert_eq!(probe.executions(), 1);
}

#[tokio::test]
async fn test_tag_filter_selection() {
    let executor = create_test_executor();
    for (name, tags) in [("only-a", vec!["a"]), ("both", vec!["a", "b"]), ("only-b", vec!["b"])] {
        executor
            .register(
                ProbeDescriptor::new(name).with_tags(tags),
                TestProbe::new(ProbeResult::ok(name)),
            )
            .unwrap();
    }

    let report = executor.run("a,-b", None).await.unwrap();
    let names: Vec<&str> = report.entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["only-a"]);

    let report = executor.run("a b", None).await.unwrap();
    let names: Vec<&str> = report.entries().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["both"]);

    let report = executor
        .run_with(&TagFilter::parse("a,b").unwrap().combine_with_or(), RunOptions::default())
        .await;
    assert_eq!(report.len(), 3);

    assert_eq!(executor.run("", None).await.unwrap().len(), 3);
    assert!(executor.run("missing", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_faulting_probes_isolated() {
    let executor = create_test_executor();
    executor
        .register(
            ProbeDescriptor::new("erroring"),
            TestProbe::with_behavior(Behavior::Fail("connection refused".to_string())),
        )
        .unwrap();
    executor
        .register(
            ProbeDescriptor::new("panicking"),
            TestProbe::with_behavior(Behavior::Panic),
        )
        .unwrap();
    executor
        .register(
            ProbeDescriptor::new("healthy"),
            TestProbe::new(ProbeResult::ok("fine")),
        )
        .unwrap();

    let report = executor.run_all().await;
    assert_eq!(report.status(), Status::HealthCheckError);
    assert_eq!(report.get("healthy").unwrap().status(), Status::Ok);

    let erroring = report.get("erroring").unwrap();
    assert_eq!(erroring.status(), Status::HealthCheckError);
    assert_eq!(erroring.result.entries()[0].level(), LogLevel::Critical);
    assert!(erroring.result.entries()[0]
        .message()
        .contains("connection refused"));

    let panicking = report.get("panicking").unwrap();
    assert_eq!(panicking.status(), Status::HealthCheckError);
    assert!(panicking.result.entries()[0]
        .message()
        .contains("test probe panicked"));

    // The executor keeps working after a panic
    assert_eq!(executor.run("", None).await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unregister_while_running() {
    let executor = create_test_executor();
    let probe = TestProbe::slow(ProbeResult::ok("fine"), Duration::from_secs(5));
    executor
        .register(ProbeDescriptor::new("slow"), probe.clone())
        .unwrap();

    let report = executor
        .run_with(
            &TagFilter::all(),
            RunOptions::default().with_timeout(Duration::from_millis(10)),
        )
        .await;
    assert_eq!(report.status(), Status::Warn);

    assert!(executor.unregister("slow"));
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(executor.record("slow").is_none());

    // Re-registration starts from a clean slate
    executor
        .register(ProbeDescriptor::new("slow"), probe.clone())
        .unwrap();
    assert_eq!(executor.record("slow").unwrap().execution_count, 0);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let executor = create_test_executor();
    executor
        .register(ProbeDescriptor::new("disk"), TestProbe::new(ProbeResult::ok("a")))
        .unwrap();
    assert!(executor
        .register(ProbeDescriptor::new("disk"), TestProbe::new(ProbeResult::ok("b")))
        .is_err());
    assert_eq!(executor.len(), 1);
    assert_eq!(executor.stats().total, 1);
    assert_eq!(executor.stats().never_executed, 1);
}
