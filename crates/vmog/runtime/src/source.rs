use crate::error::FederationErrorKind;
use async_trait::async_trait;
use semver::VersionReq;
use std::sync::Arc;
use vmog_registry::VMogRegistry;
use vmog_types::{FallbackStrategy, ModuleKey, ModuleRef, VMogRegistryEntry};

/// Where the runtime resolves modules from: the primary registry or a
/// named remote.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Name used in logs, failure contexts and `registry` fallbacks.
    fn name(&self) -> &str;

    /// Highest resolvable version satisfying `range`.
    async fn resolve(
        &self,
        key: &ModuleKey,
        range: &VersionReq,
    ) -> Result<VMogRegistryEntry, FederationErrorKind>;

    /// Verified artifact bytes of an entry.
    async fn artifact(&self, entry: &VMogRegistryEntry) -> Result<Vec<u8>, FederationErrorKind>;

    /// Fallback strategies declared by the newest known version.
    async fn fallback_strategies(
        &self,
        key: &ModuleKey,
    ) -> Result<Vec<FallbackStrategy>, FederationErrorKind>;

    /// Transitive dependents of a version.
    async fn impact_of(&self, module: &ModuleRef) -> Vec<ModuleRef>;
}

/// A [`VMogRegistry`] used as a module source.
#[derive(Clone)]
pub struct RegistrySource {
    name: String,
    registry: Arc<VMogRegistry>,
}

impl RegistrySource {
    pub fn new(name: impl Into<String>, registry: Arc<VMogRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<VMogRegistry> {
        &self.registry
    }
}

#[async_trait]
impl ModuleSource for RegistrySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        key: &ModuleKey,
        range: &VersionReq,
    ) -> Result<VMogRegistryEntry, FederationErrorKind> {
        Ok(self
            .registry
            .resolve_latest(&key.namespace, &key.name, range)
            .await?)
    }

    async fn artifact(&self, entry: &VMogRegistryEntry) -> Result<Vec<u8>, FederationErrorKind> {
        Ok(self.registry.fetch_artifact(entry).await?)
    }

    async fn fallback_strategies(
        &self,
        key: &ModuleKey,
    ) -> Result<Vec<FallbackStrategy>, FederationErrorKind> {
        Ok(self
            .registry
            .latest_known(key)
            .await?
            .map(|entry| entry.module.fallback_strategies)
            .unwrap_or_default())
    }

    async fn impact_of(&self, module: &ModuleRef) -> Vec<ModuleRef> {
        self.registry
            .impact_of(&module.namespace, &module.name, &module.version)
            .await
    }
}
