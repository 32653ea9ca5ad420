//! Loaded module instances and resolution requests.

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;
use vmog_types::{
    ContentHash, EntryPoint, FallbackStrategy, FederationConfig, IdentityError, ModuleKey,
    ModuleRef, StrategyType, VMogRegistryEntry,
};

/// A module instance held by the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedModule {
    pub module_ref: ModuleRef,
    pub commit_hash: String,
    pub entry_points: BTreeMap<String, EntryPoint>,
    pub federation: FederationConfig,
    pub dependencies: BTreeMap<String, String>,
    /// Digest of the loaded artifact bytes; zero for degraded stubs.
    pub artifact_digest: ContentHash,
    pub instance_id: Uuid,
    /// Registry or remote the instance was loaded from.
    pub source: String,
    pub loaded_at: DateTime<Utc>,
    /// Set on graceful stubs standing in for a module that failed to load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl LoadedModule {
    pub fn from_entry(entry: &VMogRegistryEntry, artifact: &[u8], source: impl Into<String>) -> Self {
        Self {
            module_ref: entry.module_ref(),
            commit_hash: entry.commit_hash.clone(),
            entry_points: entry.module.entry_points.clone(),
            federation: entry.module.federation_config.clone(),
            dependencies: entry.module.dependencies.clone(),
            artifact_digest: ContentHash::hash(artifact),
            instance_id: Uuid::new_v4(),
            source: source.into(),
            loaded_at: Utc::now(),
            degraded: None,
        }
    }

    /// Degraded stand-in with no entry points.
    pub fn stub(key: &ModuleKey, message: impl Into<String>) -> Self {
        Self {
            module_ref: key.at(Version::new(0, 0, 0)),
            commit_hash: String::new(),
            entry_points: BTreeMap::new(),
            federation: FederationConfig::default(),
            dependencies: BTreeMap::new(),
            artifact_digest: ContentHash::zero(),
            instance_id: Uuid::new_v4(),
            source: "graceful".to_string(),
            loaded_at: Utc::now(),
            degraded: Some(message.into()),
        }
    }

    pub fn key(&self) -> ModuleKey {
        self.module_ref.key()
    }

    pub fn version(&self) -> &Version {
        &self.module_ref.version
    }

    pub fn is_singleton(&self) -> bool {
        self.federation.singleton
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Path of an exposed entry point.
    pub fn entry_point(&self, exposed: &str) -> Option<&EntryPoint> {
        self.entry_points.get(exposed)
    }
}

/// A request for some version of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRequest {
    pub key: ModuleKey,
    pub range: VersionReq,
}

impl ModuleRequest {
    pub fn new(key: ModuleKey, range: VersionReq) -> Self {
        Self { key, range }
    }

    /// Parse `namespace/name@range`; a bare name takes `default_namespace`
    /// and a missing range means any version.
    pub fn parse(input: &str, default_namespace: &str) -> Result<Self, IdentityError> {
        let (module, range) = match input.rsplit_once('@') {
            Some((module, range)) if !module.is_empty() => (module, range),
            _ => (input, "*"),
        };
        let key = ModuleKey::parse_in(module, default_namespace)?;
        let range = VersionReq::parse(range).map_err(|e| IdentityError::InvalidVersion {
            input: range.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(key, range))
    }
}

impl fmt::Display for ModuleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.range)
    }
}

/// How a caller wants one resolution handled.
#[derive(Debug, Clone, Default)]
pub struct RequesterContext {
    /// Strategies to use instead of the ones the module declares.
    pub fallback_override: Option<Vec<FallbackStrategy>>,
    /// Skip fallback resolution entirely.
    pub no_fallback: bool,
    /// Bound on the whole resolution, fallbacks included.
    pub timeout: Option<Duration>,
}

impl RequesterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_fallbacks(mut self, strategies: Vec<FallbackStrategy>) -> Self {
        self.fallback_override = Some(strategies);
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.no_fallback = true;
        self
    }
}

/// A successfully resolved module and the fallback, if any, that produced it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub module: std::sync::Arc<LoadedModule>,
    pub applied: Option<StrategyType>,
}

impl Resolution {
    pub fn is_fallback(&self) -> bool {
        self.applied.is_some()
    }
}
