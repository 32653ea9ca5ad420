//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for a federation runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Environment name recorded in snapshots.
    pub environment: String,

    /// Remote name to base resolution URL.
    pub remotes: BTreeMap<String, String>,

    /// Capabilities this runtime provides to `runtimeRequirements`.
    pub capabilities: Vec<String>,

    /// Timeout for a single registry lookup or artifact fetch (milliseconds).
    pub resolve_timeout_ms: u64,

    /// Apply fallback strategies when primary resolution fails.
    pub enable_fallback: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            remotes: BTreeMap::new(),
            capabilities: Vec::new(),
            resolve_timeout_ms: 30_000,
            enable_fallback: true,
        }
    }
}

impl RuntimeConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn provides(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
