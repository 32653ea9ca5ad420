use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vmog_runtime::LoadedModule;

/// Result of probing a newly active module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Checks a module after it becomes active. The orchestrator bounds every
/// call with the verify timeout; a check that never returns counts as a
/// failure.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, module: &LoadedModule) -> HealthStatus;
}

/// Structural check: the instance is not a degraded stub, carries a
/// verified artifact and exposes at least one entry point with a path.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryPointCheck;

#[async_trait]
impl HealthCheck for EntryPointCheck {
    async fn check(&self, module: &LoadedModule) -> HealthStatus {
        if let Some(reason) = &module.degraded {
            return HealthStatus::Unhealthy(format!("degraded: {}", reason));
        }
        if module.artifact_digest.is_zero() {
            return HealthStatus::Unhealthy("no artifact loaded".into());
        }
        if module.entry_points.is_empty() {
            return HealthStatus::Unhealthy("no entry points exposed".into());
        }
        match module.entry_points.iter().find(|(_, ep)| ep.path.is_empty()) {
            Some((exposed, _)) => HealthStatus::Unhealthy(format!("entry point {} has no path", exposed)),
            None => HealthStatus::Healthy,
        }
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Healthy,
    Unhealthy(String),
    Hang,
}

/// Simulated health check for testing.
#[derive(Debug)]
pub struct SimulatedHealthCheck {
    behavior: Behavior,
    delay: Duration,
    checks: AtomicUsize,
}

impl SimulatedHealthCheck {
    pub fn healthy() -> Self {
        Self::with_behavior(Behavior::Healthy)
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Unhealthy(reason.into()))
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with_behavior(Behavior::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of checks run so far.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            checks: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HealthCheck for SimulatedHealthCheck {
    async fn check(&self, _module: &LoadedModule) -> HealthStatus {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Healthy => HealthStatus::Healthy,
            Behavior::Unhealthy(reason) => HealthStatus::Unhealthy(reason.clone()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
