//! E2E: publish identity rules, exact lookup, latest resolution and the
//! entry lifecycle.

use semver::VersionReq;
use vmog_registry::{PublishRequest, RegistryError};
use vmog_tests::{module, publish, registry, try_publish, v};
use vmog_types::{EntrySelector, EntryStatus};

#[tokio::test]
async fn identical_republish_returns_original_entry() {
    let registry = registry();
    let first = publish(&registry, module("acme", "widgets", "1.0.0")).await;
    let again = publish(&registry, module("acme", "widgets", "1.0.0")).await;

    assert_eq!(again.id, first.id);
    assert_eq!(again.published_at, first.published_at);
    assert_eq!(registry.count().await.unwrap(), 1);
}

#[tokio::test]
async fn republish_with_different_content_conflicts() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;

    let other_bytes = registry
        .publish(PublishRequest::new(module("acme", "widgets", "1.0.0"), b"rebuilt".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(other_bytes.kind(), RegistryError::Conflict(_)));

    let mut other_commit = module("acme", "widgets", "1.0.0");
    other_commit.commit_hash = "ffff00".into();
    let err = try_publish(&registry, other_commit).await.unwrap_err();
    assert!(matches!(err.kind(), RegistryError::Conflict(_)));
    assert_eq!(err.operation, "publish");
    assert_eq!(err.namespace.as_deref(), Some("acme"));
}

#[tokio::test]
async fn drifted_requirements_hash_is_a_validation_error() {
    let registry = registry();
    let mut drifted = module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0");
    drifted.requirements_hash = "0".repeat(64);

    let err = try_publish(&registry, drifted).await.unwrap_err();
    assert!(matches!(err.kind(), RegistryError::Validation(_)));
    assert_eq!(registry.count().await.unwrap(), 0);
}

#[tokio::test]
async fn get_by_version_or_commit() {
    let registry = registry();
    let entry = publish(&registry, module("acme", "widgets", "1.0.0")).await;
    assert_eq!(entry.status, EntryStatus::Published);
    assert!(entry.artifacts.cdn_url.starts_with("https://cdn.vmog.dev/"));

    let by_commit = registry
        .get("acme", "widgets", EntrySelector::Commit(entry.commit_hash.clone()))
        .await
        .unwrap();
    assert_eq!(by_commit.version, v("1.0.0"));

    let missing = registry.get("acme", "widgets", v("4.0.0")).await.unwrap_err();
    assert!(missing.is_not_found());
}

#[tokio::test]
async fn archived_versions_leave_latest_but_stay_gettable() {
    let registry = registry();
    for version in ["1.0.0", "1.1.0", "1.2.0"] {
        publish(&registry, module("acme", "widgets", version)).await;
    }
    registry.archive("acme", "widgets", &v("1.2.0")).await.unwrap();

    let range = VersionReq::parse("^1").unwrap();
    let latest = registry.resolve_latest("acme", "widgets", &range).await.unwrap();
    assert_eq!(latest.version, v("1.1.0"));

    let archived = registry.get("acme", "widgets", v("1.2.0")).await.unwrap();
    assert_eq!(archived.status, EntryStatus::Archived);
}

#[tokio::test]
async fn archiving_is_permanent() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    registry.archive("acme", "widgets", &v("1.0.0")).await.unwrap();

    let err = registry
        .deprecate("acme", "widgets", &v("1.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), RegistryError::InvalidTransition { .. }));
}

#[tokio::test]
async fn newer_minor_deprecates_superseded_version() {
    let registry = registry();
    publish(&registry, module("acme", "widgets", "1.0.0")).await;
    publish(&registry, module("acme", "widgets", "1.1.0")).await;
    publish(&registry, module("acme", "widgets", "2.0.0")).await;

    let versions = registry.versions("acme", "widgets").await.unwrap();
    let statuses: Vec<(String, EntryStatus)> = versions
        .iter()
        .map(|e| (e.version.to_string(), e.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("1.0.0".to_string(), EntryStatus::Deprecated),
            ("1.1.0".to_string(), EntryStatus::Published),
            ("2.0.0".to_string(), EntryStatus::Published),
        ]
    );
}

#[tokio::test]
async fn entry_round_trips_through_json() {
    let registry = registry();
    let entry = publish(
        &registry,
        module("acme", "app", "1.0.0").with_dependency("acme/widgets", "^1.0.0"),
    )
    .await;

    let json = serde_json::to_string(&entry).unwrap();
    assert!(json.contains("\"commitHash\""));
    assert!(json.contains("\"publishedAt\""));
    let back: vmog_types::VMogRegistryEntry = serde_json::from_str(&json).unwrap();
    assert_eq!(serde_json::to_string(&back).unwrap(), json);
}
