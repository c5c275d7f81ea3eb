//! Scheduler integration tests

use std::time::Duration;

use vigil::health::{Executor, ExecutorSettings, ProbeDescriptor, ProbeResult, Schedule, Status};

use crate::{create_test_executor, TestProbe};

#[tokio::test(start_paused = true)]
async fn test_scheduled_result_served_from_cache() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::warn("queue backlog"));
    executor
        .register(
            ProbeDescriptor::new("queue").with_schedule(Schedule::Interval(Duration::from_secs(10))),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    let executions = probe.executions();
    assert!(executions >= 1);

    // Between ticks callers get the scheduled result
    let report = executor.run("", None).await.unwrap();
    assert_eq!(report.status(), Status::Warn);
    assert_eq!(probe.executions(), executions);
    assert!(executor.records()[0].scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_unregister_stops_schedule() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::ok("fine"));
    executor
        .register(
            ProbeDescriptor::new("tick").with_schedule(Schedule::Interval(Duration::from_secs(1))),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(probe.executions() >= 4);

    executor.unregister("tick");
    let before = probe.executions();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.executions(), before);
}

#[tokio::test(start_paused = true)]
async fn test_reschedule_changes_cadence() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::ok("fine"));
    executor
        .register(ProbeDescriptor::new("flex"), probe.clone())
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.executions(), 0);

    executor
        .reschedule("flex", Some(Schedule::Interval(Duration::from_secs(1))))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;
    let after_fast = probe.executions();
    assert!((5..=6).contains(&after_fast), "executions={}", after_fast);

    executor.reschedule("flex", None).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.executions(), after_fast);
}

#[tokio::test(start_paused = true)]
async fn test_slow_scheduled_probe_skips_ticks() {
    let executor = create_test_executor();
    let probe = TestProbe::slow(ProbeResult::ok("slow"), Duration::from_millis(2_500));
    executor
        .register(
            ProbeDescriptor::new("slow").with_schedule(Schedule::Interval(Duration::from_secs(1))),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    // Ticks overlapping an execution are dropped, not queued
    assert!((3..=4).contains(&probe.executions()), "executions={}", probe.executions());
}

#[tokio::test(start_paused = true)]
async fn test_disabled_scheduler() {
    let executor = Executor::new(ExecutorSettings {
        scheduler_enabled: false,
        ..ExecutorSettings::default()
    });
    let probe = TestProbe::new(ProbeResult::ok("fine"));
    executor
        .register(
            ProbeDescriptor::new("idle").with_schedule(Schedule::Interval(Duration::from_secs(1))),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(probe.executions(), 0);
    assert!(!executor.records()[0].scheduled);

    // Synchronous runs still work
    executor.run("", None).await.unwrap();
    assert_eq!(probe.executions(), 1);
}

#[tokio::test]
async fn test_cron_schedule_fires() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::ok("fine"));
    executor
        .register(
            ProbeDescriptor::new("cron").with_schedule(Schedule::parse("cron:* * * * * *").unwrap()),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(probe.executions() >= 2, "executions={}", probe.executions());

    executor.shutdown();
    let before = probe.executions();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(probe.executions(), before);
}
