//! E2E: reverse edges, impact analysis, cycle rejection and rebuild.

use std::collections::BTreeSet;
use vmog_registry::RegistryError;
use vmog_tests::{module, publish, registry, try_publish, v};
use vmog_types::{ModuleKey, ModuleRef};

fn r(name: &str, version: &str) -> ModuleRef {
    ModuleRef::new("acme", name, v(version))
}

#[tokio::test]
async fn dependent_appears_after_publish() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;

    let dependents = registry
        .dependents_of("acme", "widgets", Some(&v("1.0.0")))
        .await;
    assert_eq!(dependents, BTreeSet::from([r("app", "1.0.0")]));

    let entry = registry.get("acme", "widgets", v("1.0.0")).await.unwrap();
    assert_eq!(entry.module.dependents, vec![r("app", "1.0.0")]);
}

#[tokio::test]
async fn version_filter_respects_declared_range() {
    let registry = registry();
    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;
    publish(
        &registry,
        module("acme", "admin", "1.0.0").with_dependency("acme/widgets", "^2.0.0"),
    )
    .await;

    let v1 = registry.dependents_of("acme", "widgets", Some(&v("1.3.0"))).await;
    assert_eq!(v1, BTreeSet::from([r("app", "1.0.0")]));
    let all = registry.dependents_of("acme", "widgets", None).await;
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn impact_is_breadth_first_and_tree_nests() {
    let registry = registry();
    publish(&registry, module("acme", "core", "1.0.0")).await;
    publish(
        &registry,
        module("acme", "widgets", "1.0.0").with_dependency("acme/core", "^1"),
    )
    .await;
    publish(
        &registry,
        module("acme", "forms", "1.0.0").with_dependency("acme/core", "^1"),
    )
    .await;
    publish(
        &registry,
        module("acme", "app", "1.0.0")
            .with_dependency("acme/widgets", "^1")
            .with_dependency("acme/forms", "^1"),
    )
    .await;

    let impact = registry.impact_of("acme", "core", &v("1.0.0")).await;
    assert_eq!(impact.len(), 3);
    assert_eq!(impact.last(), Some(&r("app", "1.0.0")));
    let direct: BTreeSet<ModuleRef> = impact[..2].iter().cloned().collect();
    assert_eq!(direct, BTreeSet::from([r("widgets", "1.0.0"), r("forms", "1.0.0")]));

    let tree = registry.dependents_tree("acme", "core", &v("1.0.0")).await;
    assert_eq!(tree.module, r("core", "1.0.0"));
    assert_eq!(tree.dependents.len(), 2);
    assert!(tree
        .dependents
        .iter()
        .all(|child| child.dependents.iter().any(|n| n.module == r("app", "1.0.0"))));
}

#[tokio::test]
async fn key_level_cycle_is_rejected() {
    let registry = registry();
    publish(&registry, module("acme", "a", "1.0.0")).await;
    publish(&registry, module("acme", "b", "1.0.0").with_dependency("acme/a", "^1")).await;

    let err = try_publish(
        &registry,
        module("acme", "a", "1.1.0").with_dependency("acme/b", "^1"),
    )
    .await
    .unwrap_err();
    match err.kind() {
        RegistryError::CyclicDependency { path } => {
            assert_eq!(path.first(), Some(&ModuleKey::new("acme", "a")));
            assert_eq!(path.last(), Some(&ModuleKey::new("acme", "a")));
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert!(registry.get("acme", "a", v("1.1.0")).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn rebuild_restores_the_same_edges() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;
    let before = registry.dependents_of("acme", "widgets", None).await;

    assert_eq!(registry.rebuild_graph().await.unwrap(), 2);
    assert_eq!(registry.dependents_of("acme", "widgets", None).await, before);
}
