//! E2E: fallback strategies applied by the runtime.

use std::sync::Arc;
use vmog_registry::{InMemoryArtifactStore, InMemoryRegistryStore, RegistryConfig, VMogRegistry};
use vmog_runtime::{FederationRuntime, RegistrySource, RequesterContext, RuntimeConfig};
use vmog_tests::{module, publish, registry, request, runtime, v};
use vmog_types::{FailureKind, FallbackStrategy, ModuleKey, StrategyType};

#[tokio::test]
async fn only_matching_priority_applies_regardless_of_order() {
    let registry = registry();
    publish(
        &registry,
        module("acme", "widgets", "1.4.0")
            .with_fallback(
                FallbackStrategy::registry(2, "mirror").when_failure(FailureKind::RegistryUnreachable),
            )
            .with_fallback(FallbackStrategy::version(1, "^1").when_failure(FailureKind::VersionNotFound))
            .with_fallback(FallbackStrategy::graceful(3, "offline").when_failure(FailureKind::Timeout)),
    )
    .await;
    let rt = runtime(registry);

    let resolved = rt
        .resolve(&request("widgets@^2"), &RequesterContext::new())
        .await
        .unwrap();
    assert_eq!(resolved.applied, Some(StrategyType::Version));
    assert_eq!(resolved.module.version(), &v("1.4.0"));
}

#[tokio::test]
async fn registry_fallback_loads_from_remote() {
    let primary = registry();
    publish(
        &primary,
        module("acme", "widgets", "1.0.0")
            .with_fallback(FallbackStrategy::registry(1, "mirror").when_failure(FailureKind::VersionNotFound)),
    )
    .await;
    let mirror = registry();
    publish(&mirror, module("acme", "widgets", "2.0.0")).await;

    let rt = FederationRuntime::new(
        Arc::new(RegistrySource::new("registry", primary)),
        RuntimeConfig::default(),
    )
    .with_remote(
        "https://mirror.vmog.dev",
        Arc::new(RegistrySource::new("mirror", mirror)),
    );

    let resolved = rt
        .resolve(&request("widgets@^2"), &RequesterContext::new())
        .await
        .unwrap();
    assert_eq!(resolved.applied, Some(StrategyType::Registry));
    assert_eq!(resolved.module.source, "mirror");
    assert_eq!(
        rt.state().remotes.get("mirror").map(String::as_str),
        Some("https://mirror.vmog.dev")
    );
}

#[tokio::test]
async fn implementation_fallback_substitutes_module() {
    let registry = registry();
    publish(&registry, module("acme", "charts-lite", "1.2.0")).await;
    let rt = runtime(registry);

    let ctx = RequesterContext::new().with_fallbacks(vec![FallbackStrategy::implementation(
        1,
        "acme",
        "charts-lite",
        "^1",
    )]);
    let resolved = rt.resolve(&request("charts@^1"), &ctx).await.unwrap();
    assert_eq!(resolved.applied, Some(StrategyType::Implementation));
    assert_eq!(resolved.module.module_ref.name, "charts-lite");
}

#[tokio::test]
async fn failing_candidate_falls_through_to_graceful_stub() {
    let registry = registry();
    let rt = runtime(registry);

    let ctx = RequesterContext::new().with_fallbacks(vec![
        FallbackStrategy::graceful(5, "charts offline"),
        FallbackStrategy::version(1, "^9"),
    ]);
    let resolved = rt.resolve(&request("charts@^1"), &ctx).await.unwrap();
    assert_eq!(resolved.applied, Some(StrategyType::Graceful));
    assert!(resolved.module.is_degraded());
    assert!(resolved.module.entry_points.is_empty());
    assert!(rt.active(&ModuleKey::new("acme", "charts")).is_none());
}

#[tokio::test]
async fn unmatched_strategies_propagate_original_error() {
    let registry = registry();
    let rt = runtime(registry);

    let ctx = RequesterContext::new().with_fallbacks(vec![
        FallbackStrategy::graceful(1, "stub").when_failure(FailureKind::Timeout)
    ]);
    let err = rt.resolve(&request("charts@^2"), &ctx).await.unwrap_err();
    assert_eq!(err.failure_kind(), FailureKind::VersionNotFound);
    assert_eq!(err.module, ModuleKey::new("acme", "charts"));
    assert_eq!(err.requested, "^2");

    let disabled = RequesterContext::new()
        .with_fallbacks(vec![FallbackStrategy::graceful(1, "stub")])
        .without_fallback();
    assert!(rt.resolve(&request("charts@^2"), &disabled).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn declared_registry_fallback_fires_when_primary_is_down() {
    let store = Arc::new(InMemoryRegistryStore::new());
    let primary = Arc::new(VMogRegistry::new(
        store.clone(),
        Arc::new(InMemoryArtifactStore::new()),
        RegistryConfig::default(),
    ));
    let mirror = registry();
    for target in [&primary, &mirror] {
        publish(
            target,
            module("acme", "widgets", "1.2.0").with_fallback(
                FallbackStrategy::registry(1, "mirror").when_failure(FailureKind::RegistryUnreachable),
            ),
        )
        .await;
    }

    let rt = FederationRuntime::new(
        Arc::new(RegistrySource::new("registry", primary)),
        RuntimeConfig::default(),
    )
    .with_remote(
        "https://mirror.vmog.dev",
        Arc::new(RegistrySource::new("mirror", mirror)),
    );
    store.fail_next(u32::MAX);

    let resolved = rt
        .resolve(&request("widgets@^1"), &RequesterContext::new())
        .await
        .unwrap();
    assert_eq!(resolved.applied, Some(StrategyType::Registry));
    assert_eq!(resolved.module.source, "mirror");
    assert_eq!(resolved.module.version(), &v("1.2.0"));
    assert!(rt.active(&ModuleKey::new("acme", "widgets")).is_some());
}
