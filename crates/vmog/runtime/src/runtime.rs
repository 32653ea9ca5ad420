//! Federation runtime
//!
//! Process-wide resolution state lives in an immutable [`RuntimeState`]
//! behind an [`ArcSwap`]. Readers load a snapshot without locking; writers
//! are serialized by a mutex, build the next state from the current one and
//! publish it with a single store, so no reader ever observes a half-applied
//! change.

use crate::config::RuntimeConfig;
use crate::error::{FederationError, FederationErrorKind, Result};
use crate::fallback::FallbackResolver;
use crate::module::{LoadedModule, ModuleRequest, RequesterContext, Resolution};
use crate::snapshot::RuntimeSnapshot;
use crate::source::ModuleSource;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use semver::{Version, VersionReq};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vmog_types::{
    FailureContext, FallbackAction, FallbackStrategy, ModuleKey, ModuleRef, VMogRegistryEntry,
};

/// Immutable view of the runtime's resolution state.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    /// Active version of every singleton module.
    pub shared_scope: BTreeMap<ModuleKey, Version>,
    /// Remote name to base resolution URL.
    pub remotes: BTreeMap<String, String>,
    /// Active instance per module.
    pub modules: BTreeMap<ModuleKey, Arc<LoadedModule>>,
}

impl RuntimeState {
    pub fn active(&self, key: &ModuleKey) -> Option<&Arc<LoadedModule>> {
        self.modules.get(key)
    }

    /// Whether `module` is the active instance of its key.
    pub fn is_active(&self, module: &ModuleRef) -> bool {
        self.modules
            .get(&module.key())
            .is_some_and(|m| &m.module_ref == module)
    }
}

/// Outcome of loading eager modules at startup.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub loaded: Vec<ModuleRef>,
    pub deferred: Vec<ModuleRequest>,
    pub failed: Vec<FederationError>,
}

/// Resolves module requests to loaded instances across a shared scope.
pub struct FederationRuntime {
    state: ArcSwap<RuntimeState>,
    writer: Mutex<()>,
    primary: Arc<dyn ModuleSource>,
    remotes: BTreeMap<String, Arc<dyn ModuleSource>>,
    /// Fallback strategies of the last entry seen per module, usable while
    /// the source that declared them is down.
    strategies: DashMap<ModuleKey, Vec<FallbackStrategy>>,
    config: RuntimeConfig,
}

impl FederationRuntime {
    pub fn new(primary: Arc<dyn ModuleSource>, config: RuntimeConfig) -> Self {
        let state = RuntimeState {
            remotes: config.remotes.clone(),
            ..Default::default()
        };
        Self {
            state: ArcSwap::from_pointee(state),
            writer: Mutex::new(()),
            primary,
            remotes: BTreeMap::new(),
            strategies: DashMap::new(),
            config,
        }
    }

    /// Register an alternate source reachable by `registry` fallbacks.
    pub fn with_remote(mut self, url: impl Into<String>, source: Arc<dyn ModuleSource>) -> Self {
        let name = source.name().to_string();
        let mut state = RuntimeState::clone(&self.state.load());
        state.remotes.insert(name.clone(), url.into());
        self.state.store(Arc::new(state));
        self.remotes.insert(name, source);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Consistent view of the whole state.
    pub fn state(&self) -> Arc<RuntimeState> {
        self.state.load_full()
    }

    pub fn active(&self, key: &ModuleKey) -> Option<Arc<LoadedModule>> {
        self.state.load().modules.get(key).cloned()
    }

    pub fn shared_version(&self, key: &ModuleKey) -> Option<Version> {
        self.state.load().shared_scope.get(key).cloned()
    }

    pub fn loaded(&self) -> Vec<Arc<LoadedModule>> {
        self.state.load().modules.values().cloned().collect()
    }

    /// Export the active modules, shared scope and remotes.
    pub fn snapshot(&self, environment: &str) -> RuntimeSnapshot {
        RuntimeSnapshot::capture(&self.state.load(), environment)
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Resolve a request to a loaded module, applying fallback strategies
    /// when primary resolution fails. If no strategy resolves, the original
    /// error is returned. A context timeout bounds the whole call.
    pub async fn resolve(
        &self,
        request: &ModuleRequest,
        ctx: &RequesterContext,
    ) -> Result<Resolution> {
        let Some(limit) = ctx.timeout else {
            return self.resolve_unbounded(request, ctx).await;
        };
        match tokio::time::timeout(limit, self.resolve_unbounded(request, ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(module = %request, limit = ?limit, "resolution abandoned at caller deadline");
                Err(FederationError::new(
                    request.key.clone(),
                    request.range.to_string(),
                    FederationErrorKind::Timeout(limit),
                ))
            }
        }
    }

    async fn resolve_unbounded(
        &self,
        request: &ModuleRequest,
        ctx: &RequesterContext,
    ) -> Result<Resolution> {
        match self.resolve_primary(request).await {
            Ok(module) => Ok(Resolution {
                module,
                applied: None,
            }),
            Err(err) if self.config.enable_fallback && !ctx.no_fallback => {
                self.resolve_fallback(request, ctx, err).await
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_primary(&self, request: &ModuleRequest) -> Result<Arc<LoadedModule>> {
        if let Some(hit) = cached(&self.state.load(), request)? {
            debug!(module = %hit.module_ref, "resolved from runtime");
            return Ok(hit);
        }
        let loaded = self.load_from(self.primary.as_ref(), request).await?;
        self.install(loaded, request).await
    }

    async fn resolve_fallback(
        &self,
        request: &ModuleRequest,
        ctx: &RequesterContext,
        err: FederationError,
    ) -> Result<Resolution> {
        let strategies = match &ctx.fallback_override {
            Some(strategies) => strategies.clone(),
            None => self.declared_strategies(&request.key).await,
        };

        let mut failure =
            FailureContext::new(err.failure_kind(), request.key.clone(), request.range.to_string());
        failure.source = err.source_name.clone();

        for strategy in FallbackResolver::candidates(&strategies, &failure) {
            match self.apply_fallback(strategy, request).await {
                Ok(module) => {
                    info!(
                        module = %request,
                        strategy = %strategy.strategy_type,
                        priority = strategy.priority,
                        resolved = %module.module_ref,
                        "resolved through fallback"
                    );
                    return Ok(Resolution {
                        module,
                        applied: Some(strategy.strategy_type),
                    });
                }
                Err(e) => debug!(
                    module = %request,
                    strategy = %strategy.strategy_type,
                    priority = strategy.priority,
                    error = %e,
                    "fallback did not resolve"
                ),
            }
        }
        Err(err)
    }

    /// Strategies remembered from the last entry seen, else those of the
    /// newest version known to the primary, else to the first remote that
    /// answers.
    async fn declared_strategies(&self, key: &ModuleKey) -> Vec<FallbackStrategy> {
        if let Some(known) = self.strategies.get(key) {
            return known.value().clone();
        }
        let sources = std::iter::once(&self.primary).chain(self.remotes.values());
        for source in sources {
            match self.timed(source.fallback_strategies(key)).await {
                Ok(strategies) => {
                    if !strategies.is_empty() {
                        self.strategies.insert(key.clone(), strategies.clone());
                    }
                    return strategies;
                }
                Err(e) => debug!(
                    module = %key,
                    source = source.name(),
                    error = %e,
                    "fallback strategies unavailable"
                ),
            }
        }
        Vec::new()
    }

    fn remember(&self, entry: &VMogRegistryEntry) {
        let strategies = &entry.module.fallback_strategies;
        if strategies.is_empty() {
            self.strategies.remove(&entry.key());
        } else {
            self.strategies.insert(entry.key(), strategies.clone());
        }
    }

    async fn apply_fallback(
        &self,
        strategy: &FallbackStrategy,
        request: &ModuleRequest,
    ) -> Result<Arc<LoadedModule>> {
        match &strategy.action {
            FallbackAction::Version { range } => {
                let range = parse_range(&request.key, range)?;
                self.resolve_primary(&ModuleRequest::new(request.key.clone(), range))
                    .await
            }
            FallbackAction::Registry { registry } => {
                let source = self.remotes.get(registry).ok_or_else(|| {
                    FederationError::new(
                        request.key.clone(),
                        request.range.to_string(),
                        FederationErrorKind::UnknownRemote(registry.clone()),
                    )
                })?;
                if let Some(hit) = cached(&self.state.load(), request)? {
                    return Ok(hit);
                }
                let loaded = self.load_from(source.as_ref(), request).await?;
                self.install(loaded, request).await
            }
            FallbackAction::Implementation {
                namespace,
                name,
                range,
            } => {
                let key = ModuleKey::new(namespace.clone(), name.clone());
                let range = parse_range(&key, range)?;
                self.resolve_primary(&ModuleRequest::new(key, range)).await
            }
            FallbackAction::Graceful { message } => {
                let message = if message.is_empty() {
                    format!("{} unavailable", request)
                } else {
                    message.clone()
                };
                Ok(Arc::new(LoadedModule::stub(&request.key, message)))
            }
        }
    }

    // ── Loading ──────────────────────────────────────────────────────

    async fn load_from(
        &self,
        source: &dyn ModuleSource,
        request: &ModuleRequest,
    ) -> Result<LoadedModule> {
        let entry = self
            .timed(source.resolve(&request.key, &request.range))
            .await
            .map_err(|kind| {
                FederationError::new(request.key.clone(), request.range.to_string(), kind)
                    .with_source(source.name())
            })?;
        self.load_entry(source, &entry).await
    }

    async fn load_entry(
        &self,
        source: &dyn ModuleSource,
        entry: &VMogRegistryEntry,
    ) -> Result<LoadedModule> {
        let fail = |kind| {
            FederationError::new(entry.key(), entry.version.to_string(), kind)
                .with_source(source.name())
        };
        self.remember(entry);
        self.check_requirements(entry).map_err(fail)?;
        let bytes = self.timed(source.artifact(entry)).await.map_err(fail)?;
        Ok(LoadedModule::from_entry(entry, &bytes, source.name()))
    }

    /// Every `runtimeRequirements` capability must be provided.
    pub fn check_requirements(
        &self,
        entry: &VMogRegistryEntry,
    ) -> std::result::Result<(), FederationErrorKind> {
        match entry
            .module
            .runtime_requirements
            .iter()
            .find(|r| !self.config.provides(r))
        {
            Some(missing) => Err(FederationErrorKind::MissingCapability(missing.clone())),
            None => Ok(()),
        }
    }

    /// Modules listed in `shared` must be active at a version satisfying
    /// `requiredVersion`, when they are active at all.
    pub fn check_shared_compat(&self, state: &RuntimeState, module: &LoadedModule) -> Result<()> {
        let required = module.federation.required_version_req().map_err(|e| {
            FederationError::new(
                module.key(),
                module.version().to_string(),
                FederationErrorKind::Invalid(e.to_string()),
            )
        })?;
        for shared in &module.federation.shared {
            let Ok(key) = ModuleKey::parse_in(shared, &module.module_ref.namespace) else {
                continue;
            };
            if key == module.key() {
                continue;
            }
            if let Some(active) = state.shared_scope.get(&key) {
                if !required.matches(active) {
                    return Err(FederationError::new(
                        key,
                        required.to_string(),
                        FederationErrorKind::SharedScopeConflict {
                            active: active.clone(),
                            requested: required.to_string(),
                        },
                    ));
                }
            }
        }
        Ok(())
    }

    /// Active modules that list `key` as shared, with the range they require.
    pub fn shared_requirements(&self, key: &ModuleKey) -> Vec<(ModuleRef, VersionReq)> {
        self.state
            .load()
            .modules
            .values()
            .filter(|m| m.key() != *key)
            .filter(|m| {
                m.federation
                    .shared
                    .iter()
                    .any(|s| ModuleKey::parse_in(s, &m.module_ref.namespace).ok().as_ref() == Some(key))
            })
            .filter_map(|m| {
                m.federation
                    .required_version_req()
                    .ok()
                    .map(|req| (m.module_ref.clone(), req))
            })
            .collect()
    }

    async fn install(
        &self,
        loaded: LoadedModule,
        request: &ModuleRequest,
    ) -> Result<Arc<LoadedModule>> {
        let _writer = self.writer.lock().await;
        let current = self.state.load_full();

        // Re-checked under the writer lock: a concurrent request may have
        // installed this module since the lock-free check.
        if let Some(hit) = cached(&current, request)? {
            return Ok(hit);
        }
        let loaded = Arc::new(loaded);
        if let Some(active) = current.modules.get(&request.key) {
            if loaded.is_singleton() {
                return Err(conflict(request, active.version()));
            }
            debug!(
                module = %loaded.module_ref,
                active = %active.module_ref,
                "loaded private instance"
            );
            return Ok(loaded);
        }

        self.check_shared_compat(&current, &loaded)?;
        let next = replaced(&current, &request.key, Some(loaded.clone()));
        self.state.store(Arc::new(next));
        info!(
            module = %loaded.module_ref,
            singleton = loaded.is_singleton(),
            source = %loaded.source,
            "module loaded"
        );
        Ok(loaded)
    }

    /// Load the eager modules among `requests`; the rest resolve on first use.
    pub async fn bootstrap(&self, requests: &[ModuleRequest]) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        for request in requests {
            let entry = match self
                .timed(self.primary.resolve(&request.key, &request.range))
                .await
            {
                Ok(entry) => entry,
                Err(kind) => {
                    let err = FederationError::new(
                        request.key.clone(),
                        request.range.to_string(),
                        kind,
                    )
                    .with_source(self.primary.name());
                    warn!(module = %request, error = %err, "bootstrap lookup failed");
                    report.failed.push(err);
                    continue;
                }
            };
            if !entry.module.federation_config.eager {
                self.remember(&entry);
                report.deferred.push(request.clone());
                continue;
            }
            let installed = match self.load_entry(self.primary.as_ref(), &entry).await {
                Ok(loaded) => self.install(loaded, request).await,
                Err(e) => Err(e),
            };
            match installed {
                Ok(module) => report.loaded.push(module.module_ref.clone()),
                Err(err) => {
                    warn!(module = %request, error = %err, "eager load failed");
                    report.failed.push(err);
                }
            }
        }
        info!(
            loaded = report.loaded.len(),
            deferred = report.deferred.len(),
            failed = report.failed.len(),
            "runtime bootstrapped"
        );
        report
    }

    /// Remove a module's active instance. Fails while loaded modules in its
    /// impact set still depend on it, unless `force`.
    pub async fn unload(&self, key: &ModuleKey, force: bool) -> Result<Arc<LoadedModule>> {
        let _writer = self.writer.lock().await;
        let current = self.state.load_full();
        let active = current.modules.get(key).cloned().ok_or_else(|| {
            FederationError::new(key.clone(), "*", FederationErrorKind::NotLoaded)
        })?;

        let live: Vec<ModuleRef> = self
            .primary
            .impact_of(&active.module_ref)
            .await
            .into_iter()
            .filter(|d| current.is_active(d))
            .collect();
        if !live.is_empty() {
            if !force {
                return Err(FederationError::new(
                    key.clone(),
                    active.version().to_string(),
                    FederationErrorKind::InUse { dependents: live },
                ));
            }
            warn!(module = %active.module_ref, dependents = live.len(), "forced unload of module in use");
        }

        self.state.store(Arc::new(replaced(&current, key, None)));
        info!(module = %active.module_ref, "module unloaded");
        Ok(active)
    }

    // ── Hot-swap support ─────────────────────────────────────────────

    /// Load `entry` side by side without making it visible.
    pub async fn stage(&self, entry: &VMogRegistryEntry) -> Result<Arc<LoadedModule>> {
        let staged = self.load_entry(self.primary.as_ref(), entry).await?;
        self.check_shared_compat(&self.state.load(), &staged)?;
        debug!(module = %staged.module_ref, instance = %staged.instance_id, "module staged");
        Ok(Arc::new(staged))
    }

    /// Make `staged` the active instance of its module in one store.
    /// Fails if the active version is no longer `expected`.
    pub async fn activate(
        &self,
        staged: Arc<LoadedModule>,
        expected: Option<&Version>,
    ) -> Result<Option<Arc<LoadedModule>>> {
        let _writer = self.writer.lock().await;
        let current = self.state.load_full();
        let key = staged.key();
        let previous = current.modules.get(&key).cloned();
        let found = previous.as_ref().map(|p| p.version());
        if found != expected {
            return Err(FederationError::new(
                key,
                staged.version().to_string(),
                FederationErrorKind::StateChanged {
                    expected: describe(expected),
                    found: describe(found),
                },
            ));
        }
        let next = replaced(&current, &key, Some(staged.clone()));
        self.state.store(Arc::new(next));
        info!(
            module = %key,
            from = %describe(found),
            to = %staged.version(),
            "active instance switched"
        );
        Ok(previous)
    }

    /// Put `previous` back as the active instance, unconditionally.
    pub async fn restore(&self, key: &ModuleKey, previous: Option<Arc<LoadedModule>>) {
        let _writer = self.writer.lock().await;
        let current = self.state.load_full();
        let version = previous.as_ref().map(|p| p.version().to_string());
        self.state.store(Arc::new(replaced(&current, key, previous)));
        info!(module = %key, version = ?version, "active instance restored");
    }

    /// Remove the active instance without a dependents check.
    pub async fn deactivate(&self, key: &ModuleKey) -> Option<Arc<LoadedModule>> {
        let _writer = self.writer.lock().await;
        let current = self.state.load_full();
        let previous = current.modules.get(key).cloned();
        if previous.is_some() {
            self.state.store(Arc::new(replaced(&current, key, None)));
            debug!(module = %key, "active instance deactivated");
        }
        previous
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, FederationErrorKind>>,
    ) -> std::result::Result<T, FederationErrorKind> {
        let timeout = self.config.resolve_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or_else(|_| Err(FederationErrorKind::Timeout(timeout)))
    }
}

/// The active instance if it satisfies the request; a conflict if the
/// active instance is a singleton that does not.
fn cached(state: &RuntimeState, request: &ModuleRequest) -> Result<Option<Arc<LoadedModule>>> {
    match state.modules.get(&request.key) {
        Some(active) if request.range.matches(active.version()) => Ok(Some(active.clone())),
        Some(active) if active.is_singleton() => Err(conflict(request, active.version())),
        _ => Ok(None),
    }
}

fn conflict(request: &ModuleRequest, active: &Version) -> FederationError {
    FederationError::new(
        request.key.clone(),
        request.range.to_string(),
        FederationErrorKind::SharedScopeConflict {
            active: active.clone(),
            requested: request.range.to_string(),
        },
    )
}

/// `current` with the active instance of `key` replaced.
fn replaced(
    current: &RuntimeState,
    key: &ModuleKey,
    replacement: Option<Arc<LoadedModule>>,
) -> RuntimeState {
    let mut next = current.clone();
    next.shared_scope.remove(key);
    match replacement {
        Some(module) => {
            if module.is_singleton() {
                next.shared_scope
                    .insert(key.clone(), module.version().clone());
            }
            next.modules.insert(key.clone(), module);
        }
        None => {
            next.modules.remove(key);
        }
    }
    next
}

fn parse_range(key: &ModuleKey, range: &str) -> Result<VersionReq> {
    VersionReq::parse(range).map_err(|e| {
        FederationError::new(key.clone(), range, FederationErrorKind::Invalid(e.to_string()))
    })
}

fn describe(version: Option<&Version>) -> String {
    version.map_or_else(|| "none".to_string(), Version::to_string)
}
