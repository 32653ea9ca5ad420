//! Registry error types

use semver::Version;
use std::time::Duration;
use thiserror::Error;
use vmog_types::{EntryStatus, ModuleKey, ValidationError};

/// Artifact store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("artifact {key} failed integrity check (content hashes to {actual})")]
    IntegrityMismatch { key: String, actual: String },

    #[error("artifact store unavailable: {0}")]
    Unavailable(String),
}

/// Registry store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("record {key} changed: expected revision {expected}, found {actual}")]
    RevisionMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Registry operation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no version of {module} satisfies {range}")]
    NoMatchingVersion { module: ModuleKey, range: String },

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("invalid status transition for {module}@{version}: {from} -> {to}")]
    InvalidTransition {
        module: ModuleKey,
        version: Version,
        from: EntryStatus,
        to: EntryStatus,
    },

    #[error("dependency cycle: {}", .path.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(" -> "))]
    CyclicDependency { path: Vec<ModuleKey> },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
}

impl RegistryError {
    /// Transient I/O failures are retried with backoff before surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RegistryError::Unavailable(_) | RegistryError::Artifact(ArtifactError::Unavailable(_))
        )
    }
}

impl From<ValidationError> for RegistryError {
    fn from(e: ValidationError) -> Self {
        RegistryError::Validation(e.issues.join("; "))
    }
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AlreadyExists(key) => RegistryError::Conflict(key),
            mismatch @ StoreError::RevisionMismatch { .. } => {
                RegistryError::ConcurrentModification(mismatch.to_string())
            }
            StoreError::NotFound(key) => RegistryError::NotFound(key),
            StoreError::Unavailable(msg) => RegistryError::Unavailable(msg),
        }
    }
}

/// A registry error with the operation and namespace it crossed the
/// registry boundary from.
#[derive(Debug, Clone, Error)]
#[error("registry {operation} failed (namespace {}): {kind}", .namespace.as_deref().unwrap_or("-"))]
pub struct VMogRegistryError {
    pub operation: &'static str,
    pub namespace: Option<String>,
    #[source]
    pub kind: RegistryError,
}

impl VMogRegistryError {
    pub fn new(operation: &'static str, namespace: Option<&str>, kind: RegistryError) -> Self {
        Self {
            operation,
            namespace: namespace.map(str::to_string),
            kind,
        }
    }

    pub fn kind(&self) -> &RegistryError {
        &self.kind
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            RegistryError::NotFound(_) | RegistryError::NoMatchingVersion { .. }
        )
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, VMogRegistryError>;
