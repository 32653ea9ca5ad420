use crate::error::ValidationError;
use crate::fallback::FallbackStrategy;
use crate::hash::ContentHash;
use crate::ids::{ModuleKey, ModuleRef};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An exposed entry point of a module artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub path: String,
    pub hash: String,
    pub signature: String,
}

/// Per-module federation declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederationConfig {
    /// Shared dependency keys (`namespace/name`).
    pub shared: Vec<String>,
    /// Remote names this module may load from.
    pub remotes: Vec<String>,
    /// Exposed paths.
    pub exposes: Vec<String>,
    /// At most one version process-wide.
    pub singleton: bool,
    /// Resolve at runtime bootstrap instead of first use.
    pub eager: bool,
    /// Range the shared dependencies must satisfy; empty means any.
    pub required_version: String,
}

impl FederationConfig {
    pub fn required_version_req(&self) -> Result<VersionReq, semver::Error> {
        if self.required_version.trim().is_empty() {
            Ok(VersionReq::STAR)
        } else {
            VersionReq::parse(&self.required_version)
        }
    }
}

/// Pointer into the artifact store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation {
    pub bucket: String,
    /// Hex BLAKE3 of the artifact bytes; filled in at publish when empty.
    pub key: String,
    pub region: String,
}

/// A published micro-module.
///
/// Identity is `(namespace, name, version, commitHash)`; everything except
/// `dependents` is immutable once published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedModule {
    pub name: String,
    pub version: Version,
    pub namespace: String,
    pub commit_hash: String,
    /// `namespace/name` (or bare name in the same namespace) → version range.
    pub dependencies: BTreeMap<String, String>,
    pub entry_points: BTreeMap<String, EntryPoint>,
    pub fallback_strategies: Vec<FallbackStrategy>,
    #[serde(default)]
    pub runtime_requirements: Vec<String>,
    pub federation_config: FederationConfig,
    pub artifacts: ArtifactLocation,
    /// Reverse edges, hydrated from the dependency graph on read.
    #[serde(default)]
    pub dependents: Vec<ModuleRef>,
    pub requirements_hash: String,
}

impl FederatedModule {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: Version,
        commit_hash: impl Into<String>,
    ) -> Self {
        let dependencies = BTreeMap::new();
        let requirements_hash = requirements_hash(&dependencies);
        Self {
            name: name.into(),
            version,
            namespace: namespace.into(),
            commit_hash: commit_hash.into(),
            dependencies,
            entry_points: BTreeMap::new(),
            fallback_strategies: Vec::new(),
            runtime_requirements: Vec::new(),
            federation_config: FederationConfig::default(),
            artifacts: ArtifactLocation::default(),
            dependents: Vec::new(),
            requirements_hash,
        }
    }

    /// Adds a dependency and reseals `requirementsHash`.
    pub fn with_dependency(mut self, module: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.insert(module.into(), range.into());
        self.requirements_hash = requirements_hash(&self.dependencies);
        self
    }

    pub fn with_entry_point(
        mut self,
        exposed: impl Into<String>,
        path: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        let exposed = exposed.into();
        if !self.federation_config.exposes.contains(&exposed) {
            self.federation_config.exposes.push(exposed.clone());
        }
        self.entry_points.insert(
            exposed,
            EntryPoint {
                path: path.into(),
                hash: hash.into(),
                signature: String::new(),
            },
        );
        self
    }

    pub fn with_fallback(mut self, strategy: FallbackStrategy) -> Self {
        self.fallback_strategies.push(strategy);
        self
    }

    pub fn with_shared(mut self, module: impl Into<String>) -> Self {
        self.federation_config.shared.push(module.into());
        self
    }

    pub fn with_required_version(mut self, range: impl Into<String>) -> Self {
        self.federation_config.required_version = range.into();
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.federation_config.singleton = singleton;
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.federation_config.eager = eager;
        self
    }

    pub fn with_runtime_requirement(mut self, capability: impl Into<String>) -> Self {
        self.runtime_requirements.push(capability.into());
        self
    }

    pub fn with_artifacts(mut self, bucket: impl Into<String>, region: impl Into<String>) -> Self {
        self.artifacts.bucket = bucket.into();
        self.artifacts.region = region.into();
        self
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn module_ref(&self) -> ModuleRef {
        self.key().at(self.version.clone())
    }

    pub fn is_singleton(&self) -> bool {
        self.federation_config.singleton
    }

    /// Dependencies with keys qualified and ranges parsed.
    pub fn parsed_dependencies(&self) -> Result<BTreeMap<ModuleKey, VersionReq>, ValidationError> {
        let mut issues = Vec::new();
        let mut parsed = BTreeMap::new();
        for (module, range) in &self.dependencies {
            let key = match ModuleKey::parse_in(module, &self.namespace) {
                Ok(key) => key,
                Err(e) => {
                    issues.push(format!("dependency '{}': {}", module, e));
                    continue;
                }
            };
            match VersionReq::parse(range) {
                Ok(req) => {
                    parsed.insert(key, req);
                }
                Err(e) => issues.push(format!("dependency '{}' range '{}': {}", module, range, e)),
            }
        }
        if issues.is_empty() {
            Ok(parsed)
        } else {
            Err(ValidationError { issues })
        }
    }

    /// Content identity of a publish: canonical JSON of the record without
    /// the `dependents` cache, followed by the artifact bytes. Build
    /// metadata travels beside the record and does not take part.
    pub fn content_digest(&self, artifact: &[u8]) -> ContentHash {
        let mut canonical = self.clone();
        canonical.dependents.clear();
        // String-keyed maps only; serialization cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        ContentHash::hash_parts(&[&bytes, artifact])
    }
}

/// Hex BLAKE3 over sorted `module@range` lines.
pub fn requirements_hash(dependencies: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (module, range) in dependencies {
        hasher.update(module.trim().as_bytes());
        hasher.update(b"@");
        hasher.update(range.trim().as_bytes());
        hasher.update(b"\n");
    }
    ContentHash::from_bytes(*hasher.finalize().as_bytes()).to_hex()
}
