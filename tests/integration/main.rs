//! Integration test entry point
//!
//! Run with: cargo test --test integration
//!
//! Timing-sensitive tests use tokio's paused clock, so they run instantly and
//! deterministically.

mod adjustable;
mod config;
mod executor;
mod policy;
mod scheduler;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use vigil::health::{Executor, ExecutorSettings, Probe, ProbeResult};

/// What a [`TestProbe`] does when executed
#[derive(Debug, Clone)]
pub enum Behavior {
    Return(ProbeResult),
    Fail(String),
    Panic,
}

/// Probe with a switchable outcome, an optional delay and an execution counter
pub struct TestProbe {
    behavior: RwLock<Behavior>,
    delay: Duration,
    executions: AtomicUsize,
}

impl TestProbe {
    pub fn new(result: ProbeResult) -> Arc<Self> {
        Self::slow(result, Duration::ZERO)
    }

    pub fn slow(result: ProbeResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior: RwLock::new(Behavior::Return(result)),
            delay,
            executions: AtomicUsize::new(0),
        })
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: RwLock::new(behavior),
            delay: Duration::ZERO,
            executions: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, result: ProbeResult) {
        *self.behavior.write() = Behavior::Return(result);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for TestProbe {
    async fn execute(&self) -> anyhow::Result<ProbeResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let behavior = self.behavior.read().clone();
        match behavior {
            Behavior::Return(result) => Ok(result),
            Behavior::Fail(message) => Err(anyhow::anyhow!(message)),
            Behavior::Panic => panic!("test probe panicked"),
        }
    }
}

pub fn create_test_executor() -> Executor {
    Executor::new(ExecutorSettings::default())
}
