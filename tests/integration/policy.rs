//! Sticky retention and grace period escalation through the executor

use std::time::Duration;

use vigil::health::{ProbeDescriptor, ProbeResult, Schedule, Status, StickyRetention};

use crate::{create_test_executor, TestProbe};

async fn status_of(executor: &vigil::Executor, name: &str) -> Status {
    executor
        .run("", None)
        .await
        .unwrap()
        .get(name)
        .unwrap()
        .status()
}

#[tokio::test(start_paused = true)]
async fn test_sticky_result_retained_for_window() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::critical("backend down"));
    executor
        .register(
            ProbeDescriptor::new("backend")
                .with_cache_ttl(Duration::ZERO)
                .with_sticky_retention(StickyRetention::For(Duration::from_secs(10))),
            probe.clone(),
        )
        .unwrap();

    // t=0
    assert_eq!(status_of(&executor, "backend").await, Status::Critical);

    // t=5: recovered, CRITICAL still shown
    tokio::time::advance(Duration::from_secs(5)).await;
    probe.set(ProbeResult::ok("backend up"));
    assert_eq!(status_of(&executor, "backend").await, Status::Critical);

    // t=8
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(status_of(&executor, "backend").await, Status::Critical);

    // t=11: window elapsed
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(status_of(&executor, "backend").await, Status::Ok);
    assert_eq!(probe.executions(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_indefinite_sticky_cleared_by_reset() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::warn("degraded"));
    executor
        .register(
            ProbeDescriptor::new("lb")
                .with_cache_ttl(Duration::ZERO)
                .with_sticky_retention(StickyRetention::Indefinite),
            probe.clone(),
        )
        .unwrap();

    assert_eq!(status_of(&executor, "lb").await, Status::Warn);
    probe.set(ProbeResult::ok("fine"));
    tokio::time::advance(Duration::from_secs(3600)).await;
    assert_eq!(status_of(&executor, "lb").await, Status::Warn);

    assert!(executor.reset("lb"));
    assert_eq!(status_of(&executor, "lb").await, Status::Ok);
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_escalation() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::temporarily_unavailable("warming up"));
    executor
        .register(
            ProbeDescriptor::new("cache")
                .with_cache_ttl(Duration::ZERO)
                .with_grace_period(Duration::from_secs(60)),
            probe.clone(),
        )
        .unwrap();

    for t in (0..=70).step_by(10) {
        let expected = if t >= 60 {
            Status::Critical
        } else {
            Status::TemporarilyUnavailable
        };
        assert_eq!(status_of(&executor, "cache").await, expected, "t={}", t);
        tokio::time::advance(Duration::from_secs(10)).await;
    }

    let record = executor.record("cache").unwrap();
    assert_eq!(record.unavailable_count, 8);
    assert_eq!(record.status(), Some(Status::Critical));

    // One OK resets the streak
    probe.set(ProbeResult::ok("ready"));
    assert_eq!(status_of(&executor, "cache").await, Status::Ok);
    assert_eq!(executor.record("cache").unwrap().unavailable_count, 0);

    probe.set(ProbeResult::temporarily_unavailable("warming up again"));
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(
        status_of(&executor, "cache").await,
        Status::TemporarilyUnavailable
    );
}

#[tokio::test(start_paused = true)]
async fn test_escalation_before_stickiness() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::temporarily_unavailable("restarting"));
    executor
        .register(
            ProbeDescriptor::new("worker")
                .with_cache_ttl(Duration::ZERO)
                .with_grace_period(Duration::from_secs(30))
                .with_sticky_retention(StickyRetention::For(Duration::from_secs(60))),
            probe.clone(),
        )
        .unwrap();

    status_of(&executor, "worker").await;
    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(status_of(&executor, "worker").await, Status::Critical);

    // The escalated result is what sticks
    probe.set(ProbeResult::ok("back"));
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(status_of(&executor, "worker").await, Status::Critical);
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_executions_escalate_without_queries() {
    let executor = create_test_executor();
    let probe = TestProbe::new(ProbeResult::temporarily_unavailable("warming up"));
    executor
        .register(
            ProbeDescriptor::new("scheduled")
                .with_schedule(Schedule::Interval(Duration::from_secs(10)))
                .with_grace_period(Duration::from_secs(60)),
            probe.clone(),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(75)).await;
    let record = executor.record("scheduled").unwrap();
    assert_eq!(record.status(), Some(Status::Critical));
    assert!(record.unavailable_count >= 7);
    executor.shutdown();
}
