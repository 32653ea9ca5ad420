//! Registry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vmog_types::DEFAULT_NAMESPACE;

/// Configuration for the registry service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Namespace used when a publish names none.
    pub default_namespace: String,

    /// Base URL artifacts are served from.
    pub cdn_base_url: String,

    /// Bucket used when a module names none.
    pub default_bucket: String,

    /// Region used when a module names none.
    pub default_region: String,

    /// Caller timeout for publish and lookups (milliseconds).
    pub timeout_ms: u64,

    /// Retries for transient store failures and optimistic write conflicts.
    pub retries: u32,

    /// Backoff between retries.
    pub backoff: BackoffConfig,

    /// Deprecate older versions on the same caret line on publish.
    pub deprecate_superseded: bool,

    /// Archive deprecated entries older than this many days.
    pub retention_days: Option<u32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            cdn_base_url: "https://cdn.vmog.dev".to_string(),
            default_bucket: "vmog-artifacts".to_string(),
            default_region: "us-east-1".to_string(),
            timeout_ms: 30_000,
            retries: 3,
            backoff: BackoffConfig::default(),
            deprecate_superseded: true,
            retention_days: None,
        }
    }
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cdn_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.cdn_base_url.trim_end_matches('/'), bucket, key)
    }

    pub fn retention(&self) -> Option<chrono::Duration> {
        self.retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

/// Backoff configuration for retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial backoff delay (milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum backoff delay (milliseconds)
    pub max_delay_ms: u64,

    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            max_delay_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(32) as i32);
        let ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}
