//! Adjustable status integration tests

use std::sync::Arc;

use vigil::health::{
    AdjustableStatus, ProbeDescriptor, ProbeResult, Status, ADJUSTABLE_STATUS_NAME,
};

use crate::{create_test_executor, TestProbe};

#[tokio::test]
async fn test_drain_node_from_load_balancer() {
    let executor = Arc::new(create_test_executor());
    executor
        .register(
            ProbeDescriptor::new("http").with_tags(["lb", "web"]),
            TestProbe::new(ProbeResult::ok("serving")),
        )
        .unwrap();
    executor
        .register(
            ProbeDescriptor::new("disk").with_tags(["os"]),
            TestProbe::new(ProbeResult::ok("plenty of space")),
        )
        .unwrap();

    let adjustable = AdjustableStatus::new(executor.clone());
    assert_eq!(executor.run("lb", None).await.unwrap().status(), Status::Ok);

    adjustable.add_critical_for_tags(["lb"]).unwrap();
    let lb = executor.run("lb", None).await.unwrap();
    assert_eq!(lb.status(), Status::Critical);
    assert_eq!(lb.len(), 2);
    assert_eq!(
        lb.get(ADJUSTABLE_STATUS_NAME).unwrap().status(),
        Status::Critical
    );

    // Probes outside the adjusted tags are unaffected
    assert_eq!(executor.run("os", None).await.unwrap().status(), Status::Ok);

    assert!(adjustable.reset());
    assert!(adjustable.active().is_none());
    let lb = executor.run("lb", None).await.unwrap();
    assert_eq!(lb.status(), Status::Ok);
    assert_eq!(lb.len(), 1);
}

#[tokio::test]
async fn test_adjustment_replaced() {
    let executor = Arc::new(create_test_executor());
    let adjustable = AdjustableStatus::new(executor.clone());

    adjustable.add_warn_for_tags(["a"]).unwrap();
    adjustable
        .add_temporarily_unavailable_for_tags(["b"])
        .unwrap();

    assert_eq!(executor.len(), 1);
    assert!(executor.run("a", None).await.unwrap().is_empty());
    assert_eq!(
        executor.run("b", None).await.unwrap().status(),
        Status::TemporarilyUnavailable
    );
    let descriptor = executor.descriptor(ADJUSTABLE_STATUS_NAME).unwrap();
    assert!(descriptor.tags.contains("b"));
    assert!(!descriptor.tags.contains("a"));
}
