use crate::runtime::RuntimeState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use vmog_types::{ContentHash, ModuleRef};

/// Exported view of a runtime's federation state for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub environment: String,
    pub taken_at: DateTime<Utc>,
    pub modules: Vec<SnapshotModule>,
    /// Singleton module key to active version.
    pub shared_scope: BTreeMap<String, String>,
    pub remotes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotModule {
    pub module: ModuleRef,
    pub commit_hash: String,
    pub exposes: Vec<String>,
    pub singleton: bool,
    pub source: String,
    pub instance_id: Uuid,
    pub artifact_digest: ContentHash,
}

impl RuntimeSnapshot {
    pub fn capture(state: &RuntimeState, environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            taken_at: Utc::now(),
            modules: state
                .modules
                .values()
                .map(|m| SnapshotModule {
                    module: m.module_ref.clone(),
                    commit_hash: m.commit_hash.clone(),
                    exposes: m.entry_points.keys().cloned().collect(),
                    singleton: m.is_singleton(),
                    source: m.source.clone(),
                    instance_id: m.instance_id,
                    artifact_digest: m.artifact_digest.clone(),
                })
                .collect(),
            shared_scope: state
                .shared_scope
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            remotes: state.remotes.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn module(&self, key: &str) -> Option<&SnapshotModule> {
        self.modules.iter().find(|m| m.module.key().to_string() == key)
    }
}
