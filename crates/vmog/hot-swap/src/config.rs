//! Hot-swap configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied to swaps that do not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotSwapConfig {
    /// Health-check window after the switch (milliseconds).
    pub verify_timeout_ms: u64,

    /// Stage the new version fully before the old one stops serving.
    pub zero_downtime: bool,

    /// Restore the previous version automatically when verification fails.
    pub rollback_on_failure: bool,
}

impl Default for HotSwapConfig {
    fn default() -> Self {
        Self {
            verify_timeout_ms: 5_000,
            zero_downtime: true,
            rollback_on_failure: true,
        }
    }
}

impl HotSwapConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn options(&self) -> SwapOptions {
        SwapOptions {
            zero_downtime: self.zero_downtime,
            rollback_on_failure: self.rollback_on_failure,
            verify_timeout: self.verify_timeout(),
            force: false,
        }
    }
}

/// Per-swap options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOptions {
    pub zero_downtime: bool,
    pub rollback_on_failure: bool,
    pub verify_timeout: Duration,
    /// Proceed even when loaded dependents declare an incompatible range.
    pub force: bool,
}

impl Default for SwapOptions {
    fn default() -> Self {
        HotSwapConfig::default().options()
    }
}

impl SwapOptions {
    pub fn with_zero_downtime(mut self, zero_downtime: bool) -> Self {
        self.zero_downtime = zero_downtime;
        self
    }

    pub fn with_rollback_on_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_failure = rollback;
        self
    }

    pub fn with_verify_timeout(mut self, timeout: Duration) -> Self {
        self.verify_timeout = timeout;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}
