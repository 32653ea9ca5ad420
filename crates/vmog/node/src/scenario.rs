//! Scripted federation scenario.
//!
//! Publishes `acme/widgets@1.0.0` and `acme/app@1.0.0` (depending on
//! widgets `^1.0.0`), loads widgets eagerly, publishes widgets 2.0.0 and
//! hot swaps to it.

use crate::Node;
use anyhow::{ensure, Context};
use semver::{Version, VersionReq};
use tracing::{info, warn};
use vmog_hot_swap::{SwapError, SwapReport};
use vmog_registry::PublishRequest;
use vmog_runtime::{ModuleRequest, RuntimeSnapshot};
use vmog_types::{BuildMetadata, EntryStatus, FederatedModule, ModuleKey, ModuleRef};

/// What the scenario observed.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub dependents: Vec<ModuleRef>,
    pub swap: Result<SwapReport, SwapError>,
    /// Active version of widgets after the swap settled.
    pub active: Option<Version>,
    pub snapshot: RuntimeSnapshot,
}

fn widgets(version: Version, commit: &str) -> FederatedModule {
    let bundle = format!("dist/widgets-{}.js", version);
    FederatedModule::new("acme", "widgets", version, commit)
        .with_entry_point("./Button", bundle, commit)
        .eager(true)
}

pub async fn run(node: &Node) -> anyhow::Result<ScenarioOutcome> {
    let metadata = BuildMetadata {
        build_time: 1_200,
        runtime_version: "1.0.0".to_string(),
        ..BuildMetadata::default()
    };

    let v1 = Version::new(1, 0, 0);
    node.registry
        .publish(
            PublishRequest::new(widgets(v1.clone(), "abc123"), b"widgets 1.0.0".to_vec())
                .with_metadata(metadata.clone()),
        )
        .await
        .context("publishing acme/widgets@1.0.0")?;
    let entry = node.registry.get("acme", "widgets", v1.clone()).await?;
    ensure!(
        entry.status == EntryStatus::Published,
        "acme/widgets@1.0.0 is {:?}",
        entry.status
    );

    let app = FederatedModule::new("acme", "app", v1.clone(), "fed987")
        .with_dependency("acme/widgets", "^1.0.0")
        .with_entry_point("./App", "dist/app.js", "fed987");
    node.registry
        .publish(PublishRequest::new(app, b"app 1.0.0".to_vec()).with_metadata(metadata.clone()))
        .await
        .context("publishing acme/app@1.0.0")?;
    let dependents: Vec<ModuleRef> = node
        .registry
        .dependents_of("acme", "widgets", Some(&v1))
        .await
        .into_iter()
        .collect();
    info!(module = "acme/widgets@1.0.0", dependents = ?dependents, "dependents");

    let v2 = Version::new(2, 0, 0);
    node.registry
        .publish(
            PublishRequest::new(widgets(v2.clone(), "def456"), b"widgets 2.0.0".to_vec())
                .with_metadata(metadata),
        )
        .await
        .context("publishing acme/widgets@2.0.0")?;

    let report = node
        .runtime
        .bootstrap(&[ModuleRequest::new(
            ModuleKey::new("acme", "widgets"),
            VersionReq::parse("^1")?,
        )])
        .await;
    ensure!(report.failed.is_empty(), "bootstrap failed: {:?}", report.failed);

    let swap = node
        .swaps
        .start_swap("acme", "widgets", v2, node.swaps.default_options())
        .await;
    if let Err(e) = &swap {
        warn!(error = %e, "swap did not commit");
    }
    let active = node
        .runtime
        .active(&ModuleKey::new("acme", "widgets"))
        .map(|m| m.version().clone());

    Ok(ScenarioOutcome {
        dependents,
        swap,
        active,
        snapshot: node.runtime.snapshot(&node.config.runtime.environment),
    })
}
