//! The V-Mog registry service.
//!
//! Owns the registry store, the artifact store and the dependency graph.
//! The graph write lock is held only around the catalog insert, so the graph
//! is updated on the same path that commits a record while uploads and
//! lookups of other modules proceed.

use crate::artifact::{content_key, ArtifactStore, InMemoryArtifactStore};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result, StoreError, VMogRegistryError};
use crate::graph::{DependencyGraph, DependentsNode};
use crate::retry::RetryPolicy;
use crate::store::{InMemoryRegistryStore, RegistryStore};
use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vmog_types::{
    validate_module, BuildMetadata, ContentHash, EntryArtifacts, EntrySelector, EntryStatus,
    FederatedModule, ModuleKey, ModuleRef, VMogRegistryEntry,
};

/// A module record together with the artifact bytes it points at.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub module: FederatedModule,
    pub artifact: Vec<u8>,
    pub metadata: BuildMetadata,
}

impl PublishRequest {
    pub fn new(module: FederatedModule, artifact: impl Into<Vec<u8>>) -> Self {
        Self {
            module,
            artifact: artifact.into(),
            metadata: BuildMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: BuildMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Versioned, content-addressed catalog of federated modules.
pub struct VMogRegistry {
    store: Arc<dyn RegistryStore>,
    artifacts: Arc<dyn ArtifactStore>,
    graph: RwLock<DependencyGraph>,
    config: RegistryConfig,
    retry: RetryPolicy,
}

impl VMogRegistry {
    /// Create a registry over existing stores. Call [`rebuild_graph`] when
    /// the store already holds records.
    ///
    /// [`rebuild_graph`]: VMogRegistry::rebuild_graph
    pub fn new(
        store: Arc<dyn RegistryStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: RegistryConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.retries, config.backoff.clone());
        Self {
            store,
            artifacts,
            graph: RwLock::new(DependencyGraph::new()),
            config,
            retry,
        }
    }

    /// Registry backed by in-memory stores.
    pub fn in_memory(config: RegistryConfig) -> Self {
        Self::new(
            Arc::new(InMemoryRegistryStore::new()),
            Arc::new(InMemoryArtifactStore::new()),
            config,
        )
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ── Publish ──────────────────────────────────────────────────────

    /// Publish a module version within the configured timeout.
    pub async fn publish(&self, request: PublishRequest) -> Result<VMogRegistryEntry> {
        self.publish_with_timeout(request, self.config.timeout()).await
    }

    /// Publish a module version.
    ///
    /// Validation, the identity check, the artifact upload and the wait for
    /// the commit slot run under `timeout`, and the deadline is checked once
    /// more right before the catalog insert. Once the insert starts it runs
    /// to completion, so a publish either commits fully or leaves no catalog
    /// record behind.
    /// Republishing identical content returns the original entry.
    pub async fn publish_with_timeout(
        &self,
        request: PublishRequest,
        timeout: Duration,
    ) -> Result<VMogRegistryEntry> {
        let namespace = request.module.namespace.clone();
        self.publish_inner(request, timeout)
            .await
            .map_err(|kind| VMogRegistryError::new("publish", Some(namespace.as_str()), kind))
    }

    async fn publish_inner(
        &self,
        request: PublishRequest,
        timeout: Duration,
    ) -> std::result::Result<VMogRegistryEntry, RegistryError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let PublishRequest {
            mut module,
            artifact,
            metadata,
        } = request;

        validate_module(&module).into_result()?;
        let dependencies = module.parsed_dependencies()?;

        let artifact_key = content_key(&artifact);
        if !module.artifacts.key.is_empty() && module.artifacts.key != artifact_key {
            return Err(RegistryError::Validation(format!(
                "artifact key {} does not match content {}",
                module.artifacts.key, artifact_key
            )));
        }
        module.artifacts.key = artifact_key;
        if module.artifacts.bucket.is_empty() {
            module.artifacts.bucket = self.config.default_bucket.clone();
        }
        if module.artifacts.region.is_empty() {
            module.artifacts.region = self.config.default_region.clone();
        }
        module.dependents.clear();
        let digest = module.content_digest(&artifact);
        let key = module.key();
        let module_ref = module.module_ref();

        // Identity check and upload run without the graph lock; the upload
        // is content-addressed, so a blob left by an abandoned publish is
        // inert.
        let prepared = tokio::time::timeout_at(deadline, async {
            if let Some(existing) = self.existing(&key, &module.version).await? {
                return settle(existing, &module, &digest).map(Some);
            }
            let artifacts = &self.artifacts;
            let location = &module.artifacts;
            let bytes = &artifact;
            self.retry
                .run("put_artifact", move || async move {
                    artifacts
                        .put(&location.bucket, &location.key, bytes.clone())
                        .await
                        .map_err(RegistryError::from)
                })
                .await?;
            Ok::<_, RegistryError>(None)
        })
        .await
        .map_err(|_| RegistryError::Timeout(timeout))??;
        if let Some(existing) = prepared {
            return Ok(hydrate(&*self.graph.read().await, existing));
        }

        let mut graph = tokio::time::timeout_at(deadline, self.graph.write())
            .await
            .map_err(|_| RegistryError::Timeout(timeout))?;
        // A concurrent publish of the same version may have committed while
        // this one was uploading.
        let raced = tokio::time::timeout_at(deadline, self.existing(&key, &module.version))
            .await
            .map_err(|_| RegistryError::Timeout(timeout))??;
        if let Some(existing) = raced {
            let existing = settle(existing, &module, &digest)?;
            return Ok(hydrate(&graph, existing));
        }
        graph.check_acyclic(&key, dependencies.keys())?;
        if tokio::time::Instant::now() >= deadline {
            return Err(RegistryError::Timeout(timeout));
        }

        let cdn_url = self
            .config
            .cdn_url(&module.artifacts.bucket, &module.artifacts.key);
        let entry = VMogRegistryEntry {
            id: Uuid::new_v4().to_string(),
            namespace: module.namespace.clone(),
            name: module.name.clone(),
            version: module.version.clone(),
            commit_hash: module.commit_hash.clone(),
            published_at: Utc::now(),
            artifacts: EntryArtifacts {
                bucket: module.artifacts.bucket.clone(),
                key: module.artifacts.key.clone(),
                region: module.artifacts.region.clone(),
                cdn_url,
            },
            metadata,
            status: EntryStatus::Published,
            deprecated_at: None,
            content_digest: digest,
            revision: 0,
            module,
        };

        let store = &self.store;
        let pending = &entry;
        let stored = self
            .retry
            .run("insert", move || {
                let entry = pending.clone();
                async move { store.insert(entry).await.map_err(RegistryError::from) }
            })
            .await?;
        graph.insert(stored.module_ref(), dependencies);
        info!(
            module = %module_ref,
            commit = %stored.commit_hash,
            digest = %stored.content_digest,
            "module published"
        );
        let stored = hydrate(&graph, stored);
        drop(graph);

        if self.config.deprecate_superseded {
            self.deprecate_superseded(&stored).await;
        }
        Ok(stored)
    }

    /// Deprecate older published versions on the same compatibility line.
    async fn deprecate_superseded(&self, published: &VMogRegistryEntry) {
        if !published.version.pre.is_empty() {
            return;
        }
        let key = published.key();
        let versions = match self.versions_inner(&key).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!(module = %key, error = %e, "could not list versions to deprecate");
                return;
            }
        };
        for older in versions.iter().filter(|e| {
            e.status == EntryStatus::Published
                && e.version < published.version
                && same_line(&e.version, &published.version)
        }) {
            match self
                .transition_inner(&key, &older.version, EntryStatus::Deprecated)
                .await
            {
                Ok(_) => info!(
                    module = %older.module_ref(),
                    superseded_by = %published.version,
                    "deprecated superseded version"
                ),
                Err(e) => warn!(
                    module = %older.module_ref(),
                    error = %e,
                    "failed to deprecate superseded version"
                ),
            }
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────

    /// Exact lookup by version or commit hash. Archived entries are found.
    pub async fn get(
        &self,
        namespace: &str,
        name: &str,
        selector: impl Into<EntrySelector>,
    ) -> Result<VMogRegistryEntry> {
        let key = ModuleKey::new(namespace, name);
        let selector = selector.into();
        self.bounded(self.get_inner(&key, &selector))
            .await
            .map_err(|kind| VMogRegistryError::new("get", Some(namespace), kind))
    }

    async fn get_inner(
        &self,
        key: &ModuleKey,
        selector: &EntrySelector,
    ) -> std::result::Result<VMogRegistryEntry, RegistryError> {
        let store = &self.store;
        let found = self
            .retry
            .run("get", move || async move {
                let found = match selector {
                    EntrySelector::Version(version) => store.get(key, version).await,
                    EntrySelector::Commit(commit) => store.find_by_commit(key, commit).await,
                };
                found.map_err(RegistryError::from)
            })
            .await?
            .ok_or_else(|| RegistryError::NotFound(format!("{} {}", key, selector)))?;
        let graph = self.graph.read().await;
        Ok(hydrate(&graph, found))
    }

    /// Highest non-archived version satisfying `range`. Ties on version
    /// break on the most recent `publishedAt`.
    pub async fn resolve_latest(
        &self,
        namespace: &str,
        name: &str,
        range: &VersionReq,
    ) -> Result<VMogRegistryEntry> {
        let key = ModuleKey::new(namespace, name);
        self.bounded(async {
            let best = self
                .versions_inner(&key)
                .await?
                .into_iter()
                .filter(|e| e.status.is_resolvable_by_range() && range.matches(&e.version))
                .max_by(|a, b| {
                    a.version
                        .cmp(&b.version)
                        .then(a.published_at.cmp(&b.published_at))
                })
                .ok_or_else(|| RegistryError::NoMatchingVersion {
                    module: key.clone(),
                    range: range.to_string(),
                })?;
            let graph = self.graph.read().await;
            Ok(hydrate(&graph, best))
        })
        .await
        .map_err(|kind| VMogRegistryError::new("resolve_latest", Some(namespace), kind))
    }

    /// Highest version of a module in any status.
    pub async fn latest_known(&self, key: &ModuleKey) -> Result<Option<VMogRegistryEntry>> {
        self.versions_inner(key)
            .await
            .map(|versions| versions.into_iter().max_by(|a, b| a.version.cmp(&b.version)))
            .map_err(|kind| VMogRegistryError::new("latest_known", Some(key.namespace.as_str()), kind))
    }

    /// All versions of a module, ascending.
    pub async fn versions(&self, namespace: &str, name: &str) -> Result<Vec<VMogRegistryEntry>> {
        self.versions_inner(&ModuleKey::new(namespace, name))
            .await
            .map_err(|kind| VMogRegistryError::new("versions", Some(namespace), kind))
    }

    async fn versions_inner(
        &self,
        key: &ModuleKey,
    ) -> std::result::Result<Vec<VMogRegistryEntry>, RegistryError> {
        let store = &self.store;
        self.retry
            .run("versions", move || async move {
                store.versions(key).await.map_err(RegistryError::from)
            })
            .await
    }

    /// Number of catalog records.
    pub async fn count(&self) -> Result<usize> {
        let store = &self.store;
        self.retry
            .run("count", move || async move {
                store.count().await.map_err(RegistryError::from)
            })
            .await
            .map_err(|kind| VMogRegistryError::new("count", None, kind))
    }

    /// Artifact bytes of an entry, verified against their content key.
    pub async fn fetch_artifact(&self, entry: &VMogRegistryEntry) -> Result<Vec<u8>> {
        let artifacts = &self.artifacts;
        let location = &entry.artifacts;
        self.retry
            .run("get_artifact", move || async move {
                artifacts
                    .get(&location.bucket, &location.key)
                    .await
                    .map_err(RegistryError::from)
            })
            .await
            .map_err(|kind| VMogRegistryError::new("fetch_artifact", Some(entry.namespace.as_str()), kind))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub async fn deprecate(
        &self,
        namespace: &str,
        name: &str,
        version: &Version,
    ) -> Result<VMogRegistryEntry> {
        self.transition_inner(&ModuleKey::new(namespace, name), version, EntryStatus::Deprecated)
            .await
            .map_err(|kind| VMogRegistryError::new("deprecate", Some(namespace), kind))
    }

    /// Archive a version. Archiving is permanent.
    pub async fn archive(
        &self,
        namespace: &str,
        name: &str,
        version: &Version,
    ) -> Result<VMogRegistryEntry> {
        self.transition_inner(&ModuleKey::new(namespace, name), version, EntryStatus::Archived)
            .await
            .map_err(|kind| VMogRegistryError::new("archive", Some(namespace), kind))
    }

    /// Archive deprecated entries past the retention window.
    pub async fn archive_expired(&self, now: DateTime<Utc>) -> Result<Vec<ModuleRef>> {
        let Some(retention) = self.config.retention() else {
            return Ok(Vec::new());
        };
        let cutoff = now - retention;
        let store = &self.store;
        let entries = self
            .retry
            .run("list", move || async move {
                store.list().await.map_err(RegistryError::from)
            })
            .await
            .map_err(|kind| VMogRegistryError::new("archive_expired", None, kind))?;

        let mut archived = Vec::new();
        for entry in entries.into_iter().filter(|e| {
            e.status == EntryStatus::Deprecated
                && e.deprecated_at.unwrap_or(e.published_at) <= cutoff
        }) {
            self.transition_inner(&entry.key(), &entry.version, EntryStatus::Archived)
                .await
                .map_err(|kind| {
                    VMogRegistryError::new("archive_expired", Some(entry.namespace.as_str()), kind)
                })?;
            archived.push(entry.module_ref());
        }
        if !archived.is_empty() {
            info!(count = archived.len(), "archived expired entries");
        }
        Ok(archived)
    }

    /// Move an entry forward in its lifecycle with an optimistic write,
    /// re-reading and retrying when the record changed underneath.
    async fn transition_inner(
        &self,
        key: &ModuleKey,
        version: &Version,
        target: EntryStatus,
    ) -> std::result::Result<VMogRegistryEntry, RegistryError> {
        let store = &self.store;
        let mut conflicts = 0;
        loop {
            let current = self
                .retry
                .run("get", move || async move {
                    store.get(key, version).await.map_err(RegistryError::from)
                })
                .await?
                .ok_or_else(|| RegistryError::NotFound(key.at(version.clone()).to_string()))?;

            if current.status == target {
                return Ok(current);
            }
            if !current.status.can_transition_to(target) {
                return Err(RegistryError::InvalidTransition {
                    module: key.clone(),
                    version: version.clone(),
                    from: current.status,
                    to: target,
                });
            }

            let expected = current.revision;
            let mut next = current;
            next.status = target;
            if target == EntryStatus::Deprecated {
                next.deprecated_at = Some(Utc::now());
            }
            let pending = &next;
            let result = self
                .retry
                .run("update", move || {
                    let entry = pending.clone();
                    async move {
                        match store.update(entry, expected).await {
                            Err(StoreError::Unavailable(msg)) => Err(RegistryError::Unavailable(msg)),
                            other => Ok(other),
                        }
                    }
                })
                .await?;

            match result {
                Ok(updated) => {
                    info!(module = %updated.module_ref(), status = %target, "status changed");
                    return Ok(updated);
                }
                Err(StoreError::RevisionMismatch { .. }) if conflicts < self.retry.max_retries() => {
                    conflicts += 1;
                    debug!(module = %key, attempt = conflicts, "revision changed, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Dependency graph ─────────────────────────────────────────────

    /// Versions depending on a module; with a version, only those whose
    /// declared range admits it.
    pub async fn dependents_of(
        &self,
        namespace: &str,
        name: &str,
        version: Option<&Version>,
    ) -> BTreeSet<ModuleRef> {
        self.graph
            .read()
            .await
            .dependents_of(&ModuleKey::new(namespace, name), version)
    }

    /// Transitive dependents, breadth first.
    pub async fn impact_of(&self, namespace: &str, name: &str, version: &Version) -> Vec<ModuleRef> {
        self.graph
            .read()
            .await
            .impact_of(&ModuleKey::new(namespace, name), version)
    }

    pub async fn dependents_tree(
        &self,
        namespace: &str,
        name: &str,
        version: &Version,
    ) -> DependentsNode {
        self.graph
            .read()
            .await
            .dependents_tree(&ModuleKey::new(namespace, name), version)
    }

    /// Range a published version declares on another module.
    pub async fn requirement(&self, dependent: &ModuleRef, on: &ModuleKey) -> Option<VersionReq> {
        self.graph.read().await.requirement(dependent, on).cloned()
    }

    /// Rebuild the dependency graph from the registry store.
    pub async fn rebuild_graph(&self) -> Result<usize> {
        let mut graph = self.graph.write().await;
        let store = &self.store;
        let entries = self
            .retry
            .run("list", move || async move {
                store.list().await.map_err(RegistryError::from)
            })
            .await
            .map_err(|kind| VMogRegistryError::new("rebuild_graph", None, kind))?;
        *graph = DependencyGraph::rebuild(&entries)
            .map_err(|kind| VMogRegistryError::new("rebuild_graph", None, kind))?;
        info!(versions = graph.len(), edges = graph.edge_count(), "dependency graph rebuilt");
        Ok(graph.len())
    }

    async fn existing(
        &self,
        key: &ModuleKey,
        version: &Version,
    ) -> std::result::Result<Option<VMogRegistryEntry>, RegistryError> {
        let store = &self.store;
        self.retry
            .run("get", move || async move {
                store.get(key, version).await.map_err(RegistryError::from)
            })
            .await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, RegistryError>>,
    ) -> std::result::Result<T, RegistryError> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| RegistryError::Timeout(timeout))?
    }
}

/// An already stored version is returned as-is when it carries the same
/// commit and content; anything else is a conflict.
fn settle(
    existing: VMogRegistryEntry,
    module: &FederatedModule,
    digest: &ContentHash,
) -> std::result::Result<VMogRegistryEntry, RegistryError> {
    if existing.commit_hash == module.commit_hash && existing.content_digest == *digest {
        debug!(module = %existing.module_ref(), "identical republish");
        return Ok(existing);
    }
    Err(RegistryError::Conflict(format!(
        "{} already published with commit {}",
        existing.module_ref(),
        existing.commit_hash
    )))
}

/// Fill the `dependents` cache of an entry from the graph.
fn hydrate(graph: &DependencyGraph, mut entry: VMogRegistryEntry) -> VMogRegistryEntry {
    entry.module.dependents = graph
        .dependents_of(&entry.key(), Some(&entry.version))
        .into_iter()
        .collect();
    entry
}

/// Same caret compatibility line: equal major, or equal minor below 1.0.
fn same_line(a: &Version, b: &Version) -> bool {
    a.major == b.major && (a.major > 0 || a.minor == b.minor)
}
