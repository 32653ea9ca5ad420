use crate::hash::ContentHash;
use crate::ids::{ModuleKey, ModuleRef};
use crate::module::FederatedModule;
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog lifecycle. Transitions only move forward:
/// `published → deprecated → archived`, and `published → archived`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Published,
    Deprecated,
    Archived,
}

impl EntryStatus {
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        *self <= next
    }

    /// Eligible for range ("latest") resolution.
    pub fn is_resolvable_by_range(&self) -> bool {
        !matches!(self, Self::Archived)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published => write!(f, "published"),
            Self::Deprecated => write!(f, "deprecated"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Build provenance attached at publish.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildMetadata {
    /// Build duration in milliseconds.
    pub build_time: u64,
    pub runtime_version: String,
    pub platform: String,
    pub arch: String,
}

impl Default for BuildMetadata {
    fn default() -> Self {
        Self {
            build_time: 0,
            runtime_version: String::new(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Artifact pointer of a catalog record, with its CDN URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryArtifacts {
    pub bucket: String,
    pub key: String,
    pub region: String,
    pub cdn_url: String,
}

/// Catalog record for one published module version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VMogRegistryEntry {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub version: Version,
    pub commit_hash: String,
    pub published_at: DateTime<Utc>,
    pub artifacts: EntryArtifacts,
    pub metadata: BuildMetadata,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_at: Option<DateTime<Utc>>,
    /// Content identity used for idempotent republish.
    pub content_digest: ContentHash,
    /// Optimistic concurrency counter, bumped on every stored write.
    pub revision: u64,
    pub module: FederatedModule,
}

impl VMogRegistryEntry {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn module_ref(&self) -> ModuleRef {
        self.key().at(self.version.clone())
    }
}

/// Exact lookup selector for `get`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntrySelector {
    Version(Version),
    Commit(String),
}

impl fmt::Display for EntrySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => write!(f, "{}", v),
            Self::Commit(c) => write!(f, "commit {}", c),
        }
    }
}

impl From<Version> for EntrySelector {
    fn from(v: Version) -> Self {
        Self::Version(v)
    }
}
