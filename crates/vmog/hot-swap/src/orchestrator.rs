//! Hot-swap orchestrator
//!
//! One swap slot per module key. A slot is claimed synchronously when a
//! swap starts, so a second request for the same module is rejected before
//! any work happens; swaps of distinct modules never share a slot and run
//! in parallel.
//!
//! Each swap runs on its own task. A caller that stops waiting does not
//! stop the swap, which always settles and frees its slot.
//!
//! The only externally visible mutation is `FederationRuntime::activate`,
//! a single store of the runtime state. The previous instance is held until
//! the swap commits, so rolling back is another single store.

use crate::config::{HotSwapConfig, SwapOptions};
use crate::error::{HotSwapError, Result, RollbackOutcome, SwapError};
use crate::health::{EntryPointCheck, HealthCheck, HealthStatus};
use crate::types::{SwapPhase, SwapReport, SwapStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use semver::Version;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vmog_registry::VMogRegistry;
use vmog_runtime::{FederationRuntime, LoadedModule};
use vmog_types::{EntryStatus, ModuleKey, ModuleRef, VMogRegistryEntry};

/// A swap whose verification failed with automatic rollback off.
struct PendingDecision {
    previous: Arc<LoadedModule>,
    plan: SwapPlan,
}

struct SwapSlot {
    status: SwapStatus,
    cancel: Arc<AtomicBool>,
    pending: Option<PendingDecision>,
}

/// Everything validation established about a swap.
struct SwapPlan {
    key: ModuleKey,
    from: Arc<LoadedModule>,
    target: VMogRegistryEntry,
    impacted: Vec<ModuleRef>,
    warnings: Vec<String>,
    started_at: DateTime<Utc>,
}

impl SwapPlan {
    fn failure(&self, stage: SwapPhase, reason: impl Into<String>, rollback: RollbackOutcome) -> SwapError {
        SwapError::Failed(HotSwapError {
            module: self.key.clone(),
            from_version: self.from.version().clone(),
            to_version: self.target.version.clone(),
            stage,
            reason: reason.into(),
            rollback,
        })
    }

    fn report(&self) -> SwapReport {
        SwapReport {
            module: self.key.clone(),
            from_version: self.from.version().clone(),
            to_version: self.target.version.clone(),
            impacted: self.impacted.clone(),
            warnings: self.warnings.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Coordinates staged, verified and reversible version transitions of
/// modules inside a running [`FederationRuntime`].
///
/// Clones share the same slots.
#[derive(Clone)]
pub struct HotSwapOrchestrator {
    registry: Arc<VMogRegistry>,
    runtime: Arc<FederationRuntime>,
    health: Arc<dyn HealthCheck>,
    config: Arc<HotSwapConfig>,
    slots: Arc<DashMap<ModuleKey, SwapSlot>>,
}

impl HotSwapOrchestrator {
    pub fn new(
        registry: Arc<VMogRegistry>,
        runtime: Arc<FederationRuntime>,
        config: HotSwapConfig,
    ) -> Self {
        Self {
            registry,
            runtime,
            health: Arc::new(EntryPointCheck),
            config: Arc::new(config),
            slots: Arc::new(DashMap::new()),
        }
    }

    pub fn with_health_check(mut self, check: impl HealthCheck + 'static) -> Self {
        self.health = Arc::new(check);
        self
    }

    pub fn config(&self) -> &HotSwapConfig {
        self.config.as_ref()
    }

    /// Options built from the configured defaults.
    pub fn default_options(&self) -> SwapOptions {
        self.config.options()
    }

    /// Current phase and impacted dependents of a module's swap slot.
    pub fn status(&self, namespace: &str, name: &str) -> SwapStatus {
        let key = ModuleKey::new(namespace, name);
        self.slots
            .get(&key)
            .map(|slot| slot.status.clone())
            .unwrap_or_else(|| SwapStatus::idle(key))
    }

    // ── Control surface ──────────────────────────────────────────────

    /// Swap the active version of a module to `target` and wait for the
    /// outcome. On any failure after the switch the previous version is
    /// active again before the error is returned, unless
    /// `rollback_on_failure` is off.
    ///
    /// Dropping the returned future leaves the swap running to completion.
    pub async fn start_swap(
        &self,
        namespace: &str,
        name: &str,
        target: Version,
        options: SwapOptions,
    ) -> Result<SwapReport> {
        let key = ModuleKey::new(namespace, name);
        let worker = self.launch(key.clone(), target, options)?;
        self.settle(&key, worker).await
    }

    /// Like [`start_swap`](Self::start_swap), on a background task. The
    /// slot is claimed before this returns. Aborting the handle only
    /// detaches from the swap.
    pub fn spawn_swap(
        &self,
        namespace: &str,
        name: &str,
        target: Version,
        options: SwapOptions,
    ) -> Result<JoinHandle<Result<SwapReport>>> {
        let key = ModuleKey::new(namespace, name);
        let worker = self.launch(key.clone(), target, options)?;
        let this = self.clone();
        Ok(tokio::spawn(async move { this.settle(&key, worker).await }))
    }

    /// Claim the slot and start the swap on its own task.
    fn launch(
        &self,
        key: ModuleKey,
        target: Version,
        options: SwapOptions,
    ) -> Result<JoinHandle<Result<SwapReport>>> {
        let cancel = self.claim(&key, &target)?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            this.run(key, target, options, cancel).await
        }))
    }

    async fn settle(
        &self,
        key: &ModuleKey,
        worker: JoinHandle<Result<SwapReport>>,
    ) -> Result<SwapReport> {
        match worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(module = %key, error = %e, "swap task ended abnormally");
                self.finish(key, Some(e.to_string()));
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                Err(SwapError::Aborted(key.clone()))
            }
        }
    }

    /// Abort a swap that has not switched versions yet.
    pub fn cancel(&self, namespace: &str, name: &str) -> Result<()> {
        let key = ModuleKey::new(namespace, name);
        let slot = self.slots.get(&key);
        let phase = slot.as_ref().map_or(SwapPhase::Idle, |s| s.status.phase);
        match slot {
            Some(slot) if phase.is_cancellable() => {
                slot.cancel.store(true, Ordering::SeqCst);
                info!(module = %key, phase = %phase, "swap cancellation requested");
                Ok(())
            }
            _ => Err(SwapError::NotCancellable { module: key, phase }),
        }
    }

    /// Keep the new version of a swap parked after failed verification.
    pub fn commit(&self, namespace: &str, name: &str) -> Result<SwapReport> {
        let key = ModuleKey::new(namespace, name);
        let pending = self.take_pending(&key)?;
        self.enter(&key, SwapPhase::Committed);
        let report = pending.plan.report();
        drop(pending.previous);
        self.finish(&key, None);
        info!(module = %key, version = %report.to_version, "swap committed by operator");
        Ok(report)
    }

    /// Restore the previous version of a swap parked after failed
    /// verification. Returns the restored version.
    pub async fn rollback(&self, namespace: &str, name: &str) -> Result<Version> {
        let key = ModuleKey::new(namespace, name);
        let pending = self.take_pending(&key)?;
        self.enter(&key, SwapPhase::RollingBack);
        let restored = pending.previous.version().clone();
        self.runtime.restore(&key, Some(pending.previous)).await;
        self.finish(&key, Some("rolled back by operator".to_string()));
        Ok(restored)
    }

    // ── State machine ────────────────────────────────────────────────

    async fn run(
        &self,
        key: ModuleKey,
        target: Version,
        options: SwapOptions,
        cancel: Arc<AtomicBool>,
    ) -> Result<SwapReport> {
        let outcome = self.execute(&key, &target, options, &cancel).await;
        match &outcome {
            Ok(report) => {
                info!(module = %key, from = %report.from_version, to = %report.to_version, "swap committed");
                self.finish(&key, None);
            }
            // Parked: the slot stays in Verifying until commit or rollback.
            Err(SwapError::Failed(e)) if e.rollback == RollbackOutcome::AwaitingDecision => {}
            Err(e) => {
                warn!(module = %key, to = %target, error = %e, "swap did not commit");
                self.finish(&key, Some(e.to_string()));
            }
        }
        outcome
    }

    async fn execute(
        &self,
        key: &ModuleKey,
        target: &Version,
        options: SwapOptions,
        cancel: &AtomicBool,
    ) -> Result<SwapReport> {
        let plan = self.validate(key, target, options).await?;
        checkpoint(key, SwapPhase::Validating, cancel)?;

        self.enter(key, SwapPhase::Staging);
        let staged = self.runtime.stage(&plan.target).await.map_err(|e| {
            plan.failure(SwapPhase::Staging, e.to_string(), RollbackOutcome::NotRequired)
        })?;
        self.begin_switch(key, cancel)?;
        let switched = if options.zero_downtime {
            self.runtime
                .activate(staged.clone(), Some(plan.from.version()))
                .await
        } else {
            // The old version stops serving before the new one is active.
            self.runtime.deactivate(key).await;
            self.runtime.activate(staged.clone(), None).await
        };
        let previous = match switched {
            Ok(previous) => previous.unwrap_or_else(|| plan.from.clone()),
            Err(e) if options.zero_downtime => {
                return Err(plan.failure(SwapPhase::Swapping, e.to_string(), RollbackOutcome::NotRequired));
            }
            Err(e) => {
                self.runtime.restore(key, Some(plan.from.clone())).await;
                return Err(plan.failure(
                    SwapPhase::Swapping,
                    e.to_string(),
                    RollbackOutcome::RolledBack {
                        restored: plan.from.version().clone(),
                    },
                ));
            }
        };

        self.enter(key, SwapPhase::Verifying);
        if let Err(reason) = self.verify(&staged, options.verify_timeout).await {
            if !options.rollback_on_failure {
                warn!(module = %key, reason = %reason, "verification failed, awaiting decision");
                let err = plan.failure(SwapPhase::Verifying, reason.clone(), RollbackOutcome::AwaitingDecision);
                self.park(key, previous, plan, reason);
                return Err(err);
            }
            self.enter(key, SwapPhase::RollingBack);
            let restored = previous.version().clone();
            self.runtime.restore(key, Some(previous)).await;
            return Err(plan.failure(
                SwapPhase::Verifying,
                reason,
                RollbackOutcome::RolledBack { restored },
            ));
        }

        self.enter(key, SwapPhase::Committed);
        debug!(module = %key, released = %previous.module_ref, "previous instance released");
        drop(previous);
        Ok(plan.report())
    }

    /// Target exists and is resolvable, differs from the active version,
    /// fits the shared scope, and no loaded dependent rules it out.
    async fn validate(
        &self,
        key: &ModuleKey,
        target: &Version,
        options: SwapOptions,
    ) -> Result<SwapPlan> {
        let started_at = Utc::now();
        let entry = match self.registry.get(&key.namespace, &key.name, target.clone()).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => {
                return Err(SwapError::validation(key, format!("{} is not published", key.at(target.clone()))));
            }
            Err(e) => return Err(e.into()),
        };
        if entry.status == EntryStatus::Archived {
            return Err(SwapError::validation(key, format!("{} is archived", entry.module_ref())));
        }
        let from = self
            .runtime
            .active(key)
            .ok_or_else(|| SwapError::validation(key, "module is not loaded"))?;
        if from.version() == target {
            return Err(SwapError::validation(key, format!("{} is already active", target)));
        }
        self.runtime
            .check_requirements(&entry)
            .map_err(|kind| SwapError::validation(key, kind.to_string()))?;
        let candidate = LoadedModule::from_entry(&entry, &[], "validation");
        self.runtime
            .check_shared_compat(&self.runtime.state(), &candidate)
            .map_err(|e| SwapError::validation(key, e.to_string()))?;

        let impacted = self
            .registry
            .impact_of(&key.namespace, &key.name, from.version())
            .await;
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.status.from_version = Some(from.version().clone());
            slot.status.impacted = impacted.clone();
        }
        let incompatible = self.incompatible_dependents(key, target, &impacted).await;
        if !incompatible.is_empty() {
            if !options.force {
                return Err(SwapError::validation(key, incompatible.join("; ")));
            }
            warn!(module = %key, conflicts = incompatible.len(), "forcing swap past incompatible dependents");
        }

        info!(
            module = %key,
            from = %from.version(),
            to = %target,
            impacted = impacted.len(),
            "swap validated"
        );
        Ok(SwapPlan {
            key: key.clone(),
            from,
            target: entry,
            impacted,
            warnings: incompatible,
            started_at,
        })
    }

    /// Loaded dependents whose declared range excludes `target`, and loaded
    /// modules sharing the key whose `requiredVersion` excludes it.
    async fn incompatible_dependents(
        &self,
        key: &ModuleKey,
        target: &Version,
        impacted: &[ModuleRef],
    ) -> Vec<String> {
        let state = self.runtime.state();
        let mut found = Vec::new();
        for dependent in impacted.iter().filter(|d| state.is_active(d)) {
            if let Some(range) = self.registry.requirement(dependent, key).await {
                if !range.matches(target) {
                    found.push(format!("{} requires {} {}", dependent, key, range));
                }
            }
        }
        for (consumer, range) in self.runtime.shared_requirements(key) {
            if !range.matches(target) {
                found.push(format!("{} shares {} at {}", consumer, key, range));
            }
        }
        found
    }

    async fn verify(&self, module: &LoadedModule, window: Duration) -> std::result::Result<(), String> {
        match tokio::time::timeout(window, self.health.check(module)).await {
            Ok(HealthStatus::Healthy) => Ok(()),
            Ok(HealthStatus::Unhealthy(reason)) => Err(format!("health check failed: {}", reason)),
            Err(_) => Err(format!("health check timed out after {:?}", window)),
        }
    }

    // ── Slots ────────────────────────────────────────────────────────

    fn claim(&self, key: &ModuleKey, target: &Version) -> Result<Arc<AtomicBool>> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut status = SwapStatus::idle(key.clone());
        status.phase = SwapPhase::Validating;
        status.to_version = Some(target.clone());
        status.started_at = Some(Utc::now());
        let slot = SwapSlot {
            status,
            cancel: cancel.clone(),
            pending: None,
        };
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let phase = occupied.get().status.phase;
                if phase.is_busy() {
                    return Err(SwapError::InProgress {
                        module: key.clone(),
                        phase,
                    });
                }
                occupied.insert(slot);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
            }
        }
        info!(module = %key, to = %target, "swap started");
        Ok(cancel)
    }

    /// Last cancellation point. Checked and left under the slot lock, so a
    /// cancel either lands before the switch or is refused.
    fn begin_switch(&self, key: &ModuleKey, cancel: &AtomicBool) -> Result<()> {
        if let Some(mut slot) = self.slots.get_mut(key) {
            checkpoint(key, SwapPhase::Staging, cancel)?;
            slot.status.phase = SwapPhase::Swapping;
        }
        info!(module = %key, phase = %SwapPhase::Swapping, "swap phase");
        Ok(())
    }

    fn enter(&self, key: &ModuleKey, phase: SwapPhase) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.status.phase = phase;
        }
        info!(module = %key, phase = %phase, "swap phase");
    }

    fn park(&self, key: &ModuleKey, previous: Arc<LoadedModule>, plan: SwapPlan, reason: String) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.status.awaiting_decision = true;
            slot.status.last_error = Some(reason);
            slot.pending = Some(PendingDecision { previous, plan });
        }
    }

    fn take_pending(&self, key: &ModuleKey) -> Result<PendingDecision> {
        self.slots
            .get_mut(key)
            .and_then(|mut slot| slot.pending.take())
            .ok_or_else(|| SwapError::NoPendingDecision(key.clone()))
    }

    /// Back to idle, keeping the versions and impact list of the last swap.
    fn finish(&self, key: &ModuleKey, error: Option<String>) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.status.phase = SwapPhase::Idle;
            slot.status.awaiting_decision = false;
            slot.status.last_error = error;
            slot.pending = None;
        }
    }
}

fn checkpoint(key: &ModuleKey, phase: SwapPhase, cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        info!(module = %key, phase = %phase, "swap cancelled");
        return Err(SwapError::Cancelled {
            module: key.clone(),
            phase,
        });
    }
    Ok(())
}
