#![deny(unsafe_code)]
//! # vmog-node
//!
//! Wires a registry, a federation runtime and a hot-swap orchestrator
//! together from one [`NodeConfig`], and drives them through a scripted
//! publish → resolve → swap → snapshot scenario.

pub mod config;
pub mod scenario;

pub use config::NodeConfig;
pub use scenario::ScenarioOutcome;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vmog_hot_swap::{HealthCheck, HotSwapOrchestrator};
use vmog_registry::VMogRegistry;
use vmog_runtime::{FederationRuntime, RegistrySource};

/// Install the fmt subscriber. `RUST_LOG` wins over `filter`.
pub fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A registry, the runtime resolving from it, and the orchestrator
/// swapping modules inside that runtime.
pub struct Node {
    pub config: NodeConfig,
    pub registry: Arc<VMogRegistry>,
    pub runtime: Arc<FederationRuntime>,
    pub swaps: Arc<HotSwapOrchestrator>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        let (registry, runtime) = Self::services(&config);
        let swaps = HotSwapOrchestrator::new(registry.clone(), runtime.clone(), config.hot_swap.clone());
        Self::assemble(config, registry, runtime, swaps)
    }

    /// Like [`new`](Self::new), verifying swaps with `check`.
    pub fn with_health_check(config: NodeConfig, check: impl HealthCheck + 'static) -> Self {
        let (registry, runtime) = Self::services(&config);
        let swaps = HotSwapOrchestrator::new(registry.clone(), runtime.clone(), config.hot_swap.clone())
            .with_health_check(check);
        Self::assemble(config, registry, runtime, swaps)
    }

    fn services(config: &NodeConfig) -> (Arc<VMogRegistry>, Arc<FederationRuntime>) {
        let registry = Arc::new(VMogRegistry::in_memory(config.registry.clone()));
        let runtime = Arc::new(FederationRuntime::new(
            Arc::new(RegistrySource::new("registry", registry.clone())),
            config.runtime.clone(),
        ));
        (registry, runtime)
    }

    fn assemble(
        config: NodeConfig,
        registry: Arc<VMogRegistry>,
        runtime: Arc<FederationRuntime>,
        swaps: HotSwapOrchestrator,
    ) -> Self {
        Self {
            config,
            registry,
            runtime,
            swaps: Arc::new(swaps),
        }
    }
}
