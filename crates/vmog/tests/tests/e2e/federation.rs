//! E2E: resolution across the shared scope, eager bootstrap and unload.

use std::sync::Arc;
use vmog_runtime::{FederationErrorKind, RequesterContext, RuntimeSnapshot};
use vmog_tests::{entry_path, module, publish, registry, request, runtime, v};
use vmog_types::ModuleKey;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_incompatible_singleton_requests() {
    let registry = registry();
    publish(&registry, module("acme", "react", "17.0.2").singleton(true)).await;
    publish(&registry, module("acme", "react", "18.2.0").singleton(true)).await;
    let rt = runtime(registry);

    let (a, b) = {
        let (rt_a, rt_b) = (Arc::clone(&rt), Arc::clone(&rt));
        let a = tokio::spawn(async move {
            rt_a.resolve(&request("react@^17"), &RequesterContext::new().without_fallback())
                .await
        });
        let b = tokio::spawn(async move {
            rt_b.resolve(&request("react@^18"), &RequesterContext::new().without_fallback())
                .await
        });
        (a.await.unwrap(), b.await.unwrap())
    };

    let outcomes = [&a, &b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_shared_scope_conflict()))
        .count();
    assert_eq!((successes, conflicts), (1, 1));

    let winner = a.or(b).unwrap();
    let key = ModuleKey::new("acme", "react");
    assert_eq!(rt.shared_version(&key).as_ref(), Some(winner.module.version()));
    assert_eq!(rt.loaded().len(), 1);
}

#[tokio::test]
async fn compatible_singleton_requests_share_one_instance() {
    let registry = registry();
    publish(&registry, module("acme", "react", "18.2.0").singleton(true)).await;
    let rt = runtime(registry);

    let (caret, floor, ctx) = (request("react@^18"), request("react@>=18.1"), RequesterContext::new());
    let (a, b) = futures::join!(rt.resolve(&caret, &ctx), rt.resolve(&floor, &ctx));
    assert_eq!(a.unwrap().module.instance_id, b.unwrap().module.instance_id);
}

#[tokio::test]
async fn eager_modules_load_at_bootstrap() {
    let registry = registry();
    publish(&registry, module("acme", "shell", "1.0.0").eager(true)).await;
    publish(&registry, module("acme", "charts", "1.0.0")).await;
    let rt = runtime(registry);

    let report = rt
        .bootstrap(&[
            request("shell@^1"),
            request("charts@^1"),
            request("missing@^1"),
        ])
        .await;
    assert_eq!(report.loaded.len(), 1);
    assert_eq!(report.deferred, vec![request("charts@^1")]);
    assert_eq!(report.failed.len(), 1);

    let shell = rt.active(&ModuleKey::new("acme", "shell")).unwrap();
    assert_eq!(shell.entry_point("./index").unwrap().path, entry_path("shell", "1.0.0"));
    assert!(rt.active(&ModuleKey::new("acme", "charts")).is_none());
}

#[tokio::test]
async fn unload_refuses_while_dependents_are_loaded() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;
    let rt = runtime(registry);
    rt.resolve(&request("widgets@^1"), &RequesterContext::new()).await.unwrap();
    rt.resolve(&request("app@^1"), &RequesterContext::new()).await.unwrap();

    let widgets = ModuleKey::new("acme", "widgets");
    let err = rt.unload(&widgets, false).await.unwrap_err();
    match &err.kind {
        FederationErrorKind::InUse { dependents } => {
            assert_eq!(dependents.len(), 1);
            assert_eq!(dependents[0].name, "app");
        }
        other => panic!("expected in-use, got {other}"),
    }

    rt.unload(&ModuleKey::new("acme", "app"), false).await.unwrap();
    let unloaded = rt.unload(&widgets, false).await.unwrap();
    assert_eq!(unloaded.version(), &v("1.0.0"));
    assert!(rt.loaded().is_empty());
}

#[tokio::test]
async fn forced_unload_ignores_dependents() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;
    let rt = runtime(registry);
    rt.resolve(&request("widgets@^1"), &RequesterContext::new()).await.unwrap();
    rt.resolve(&request("app@^1"), &RequesterContext::new()).await.unwrap();

    rt.unload(&ModuleKey::new("acme", "widgets"), true).await.unwrap();
    assert_eq!(rt.loaded().len(), 1);
}

#[tokio::test]
async fn missing_runtime_capability_blocks_load() {
    let registry = registry();
    publish(
        &registry,
        module("acme", "gpu-charts", "1.0.0").with_runtime_requirement("webgl"),
    )
    .await;
    let rt = runtime(registry);

    let err = rt
        .resolve(&request("gpu-charts"), &RequesterContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err.kind, FederationErrorKind::MissingCapability(ref c) if c == "webgl"));
}

#[tokio::test]
async fn snapshot_round_trips() {
    let registry = registry();
    publish(&registry, module("acme", "react", "18.2.0").singleton(true)).await;
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    let rt = runtime(registry);
    rt.resolve(&request("react"), &RequesterContext::new()).await.unwrap();
    rt.resolve(&request("widgets"), &RequesterContext::new()).await.unwrap();

    let snapshot = rt.snapshot("production");
    assert_eq!(snapshot.modules.len(), 2);
    assert_eq!(snapshot.shared_scope.get("acme/react").map(String::as_str), Some("18.2.0"));
    assert!(!snapshot.shared_scope.contains_key("acme/widgets"));

    let json = snapshot.to_json().unwrap();
    assert_eq!(RuntimeSnapshot::from_json(&json).unwrap(), snapshot);
}
