//! E2E: hot swaps observed through resolution.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vmog_hot_swap::{
    HotSwapConfig, HotSwapOrchestrator, RollbackOutcome, SimulatedHealthCheck, SwapOptions,
    SwapPhase,
};
use vmog_registry::VMogRegistry;
use vmog_runtime::{FederationRuntime, RequesterContext};
use vmog_tests::{entry_path, module, publish, registry, request, runtime, v};
use vmog_types::{EntryStatus, FederatedModule, ModuleKey, ModuleRef};

fn widgets(version: &str, commit: &str) -> FederatedModule {
    let mut m = module("acme", "widgets", version);
    m.commit_hash = commit.to_string();
    m
}

async fn setup() -> (Arc<VMogRegistry>, Arc<FederationRuntime>) {
    let registry = registry();
    publish(&registry, widgets("1.0.0", "abc123")).await;
    publish(&registry, widgets("2.0.0", "def456")).await;
    let rt = runtime(registry.clone());
    rt.resolve(&request("widgets@^1"), &RequesterContext::new())
        .await
        .unwrap();
    (registry, rt)
}

#[tokio::test(start_paused = true)]
async fn verify_timeout_scenario() {
    let registry = registry();
    let published = publish(&registry, widgets("1.0.0", "abc123")).await;
    let entry = registry.get("acme", "widgets", v("1.0.0")).await.unwrap();
    assert_eq!(entry.status, EntryStatus::Published);
    assert_eq!(entry.id, published.id);

    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;
    let dependents: Vec<ModuleRef> = registry
        .dependents_of("acme", "widgets", Some(&v("1.0.0")))
        .await
        .into_iter()
        .collect();
    assert_eq!(dependents, vec![ModuleRef::new("acme", "app", v("1.0.0"))]);

    publish(&registry, widgets("2.0.0", "def456")).await;
    let rt = runtime(registry.clone());
    rt.resolve(&request("widgets@^1"), &RequesterContext::new())
        .await
        .unwrap();

    let swaps = HotSwapOrchestrator::new(registry, rt.clone(), HotSwapConfig::default())
        .with_health_check(SimulatedHealthCheck::hanging());
    let err = swaps
        .start_swap("acme", "widgets", v("2.0.0"), SwapOptions::default())
        .await
        .unwrap_err();

    let failure = err.hot_swap().expect("a hot swap error");
    assert_eq!(failure.module, ModuleKey::new("acme", "widgets"));
    assert_eq!(failure.from_version, v("1.0.0"));
    assert_eq!(failure.to_version, v("2.0.0"));
    assert_eq!(failure.stage, SwapPhase::Verifying);
    assert_eq!(failure.rollback, RollbackOutcome::RolledBack { restored: v("1.0.0") });

    let status = swaps.status("acme", "widgets");
    assert_eq!(status.phase, SwapPhase::Idle);
    assert_eq!(status.impacted, dependents);
    let active = rt.active(&ModuleKey::new("acme", "widgets")).unwrap();
    assert_eq!(active.version(), &v("1.0.0"));
}

/// Readers resolving during a swap must always see one version's entry
/// points, never a mix.
async fn observe_during_swap(
    rt: Arc<FederationRuntime>,
    swap: impl std::future::Future<Output = ()>,
) -> BTreeSet<String> {
    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let (rt, done) = (rt.clone(), done.clone());
        readers.push(tokio::spawn(async move {
            let mut seen = BTreeSet::new();
            let request = request("widgets");
            while !done.load(Ordering::SeqCst) {
                let resolved = rt.resolve(&request, &RequesterContext::new()).await.unwrap();
                let version = resolved.module.version().to_string();
                let path = &resolved.module.entry_point("./index").unwrap().path;
                assert_eq!(path, &entry_path("widgets", &version));
                assert!(!resolved.module.commit_hash.is_empty());
                seen.insert(version);
                tokio::task::yield_now().await;
            }
            seen
        }));
    }
    swap.await;
    done.store(true, Ordering::SeqCst);
    let mut seen = BTreeSet::new();
    for reader in readers {
        seen.extend(reader.await.unwrap());
    }
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn committed_swap_serves_only_whole_versions() {
    let (registry, rt) = setup().await;
    let swaps = HotSwapOrchestrator::new(registry, rt.clone(), HotSwapConfig::default())
        .with_health_check(SimulatedHealthCheck::healthy().with_delay(Duration::from_millis(20)));

    let seen = observe_during_swap(rt.clone(), async {
        swaps
            .start_swap("acme", "widgets", v("2.0.0"), SwapOptions::default())
            .await
            .unwrap();
    })
    .await;
    assert!(seen.iter().all(|s| s == "1.0.0" || s == "2.0.0"));

    let after = rt.resolve(&request("widgets"), &RequesterContext::new()).await.unwrap();
    assert_eq!(after.module.entry_point("./index").unwrap().path, entry_path("widgets", "2.0.0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rolled_back_swap_returns_original_entry_points() {
    let (registry, rt) = setup().await;
    let original = rt.active(&ModuleKey::new("acme", "widgets")).unwrap();
    let swaps = HotSwapOrchestrator::new(registry, rt.clone(), HotSwapConfig::default())
        .with_health_check(SimulatedHealthCheck::unhealthy("error rate 40%"));

    observe_during_swap(rt.clone(), async {
        let err = swaps
            .start_swap("acme", "widgets", v("2.0.0"), SwapOptions::default())
            .await
            .unwrap_err();
        assert!(err.hot_swap().unwrap().was_rolled_back());
    })
    .await;

    let after = rt.resolve(&request("widgets"), &RequesterContext::new()).await.unwrap();
    assert_eq!(after.module.instance_id, original.instance_id);
    assert_eq!(after.module.entry_point("./index").unwrap().path, entry_path("widgets", "1.0.0"));
}

#[tokio::test(start_paused = true)]
async fn status_reports_progress_of_background_swap() {
    let (registry, rt) = setup().await;
    let swaps = Arc::new(
        HotSwapOrchestrator::new(registry, rt.clone(), HotSwapConfig::default())
            .with_health_check(SimulatedHealthCheck::healthy().with_delay(Duration::from_secs(2))),
    );

    let handle = swaps
        .spawn_swap("acme", "widgets", v("2.0.0"), SwapOptions::default())
        .unwrap();
    assert_eq!(swaps.status("acme", "widgets").phase, SwapPhase::Validating);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let mid = swaps.status("acme", "widgets");
    assert_eq!(mid.phase, SwapPhase::Verifying);
    assert_eq!(mid.from_version, Some(v("1.0.0")));
    assert_eq!(mid.to_version, Some(v("2.0.0")));
    assert!(swaps.cancel("acme", "widgets").is_err());

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.to_version, v("2.0.0"));
    assert_eq!(swaps.status("acme", "widgets").phase, SwapPhase::Idle);
}
