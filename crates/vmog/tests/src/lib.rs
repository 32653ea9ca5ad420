//! Shared fixtures for the cross-crate tests under `tests/`.

use semver::Version;
use std::sync::Arc;
use vmog_registry::{PublishRequest, RegistryConfig, VMogRegistry, VMogRegistryError};
use vmog_runtime::{FederationRuntime, ModuleRequest, RegistrySource, RuntimeConfig};
use vmog_types::{FederatedModule, VMogRegistryEntry};

pub fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

/// A module with one entry point whose path names its version.
pub fn module(namespace: &str, name: &str, version: &str) -> FederatedModule {
    let commit = format!("{}{}", name.replace('-', ""), version.replace('.', ""));
    FederatedModule::new(namespace, name, v(version), commit)
        .with_entry_point("./index", entry_path(name, version), "h")
}

pub fn entry_path(name: &str, version: &str) -> String {
    format!("dist/{}-{}.js", name, version)
}

pub fn registry() -> Arc<VMogRegistry> {
    Arc::new(VMogRegistry::in_memory(RegistryConfig::default()))
}

pub async fn try_publish(
    registry: &VMogRegistry,
    module: FederatedModule,
) -> Result<VMogRegistryEntry, VMogRegistryError> {
    let bytes = format!("{}/{}@{}", module.namespace, module.name, module.version).into_bytes();
    registry.publish(PublishRequest::new(module, bytes)).await
}

pub async fn publish(registry: &VMogRegistry, module: FederatedModule) -> VMogRegistryEntry {
    try_publish(registry, module).await.unwrap()
}

pub fn runtime(registry: Arc<VMogRegistry>) -> Arc<FederationRuntime> {
    Arc::new(FederationRuntime::new(
        Arc::new(RegistrySource::new("registry", registry)),
        RuntimeConfig::default(),
    ))
}

/// `namespace/name@range`, bare names in `acme`.
pub fn request(s: &str) -> ModuleRequest {
    ModuleRequest::parse(s, "acme").unwrap()
}
