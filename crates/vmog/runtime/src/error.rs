//! Federation runtime error types

use semver::Version;
use std::time::Duration;
use thiserror::Error;
use vmog_registry::{ArtifactError, RegistryError, VMogRegistryError};
use vmog_types::{FailureKind, ModuleKey, ModuleRef};

/// What went wrong while resolving or loading a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederationErrorKind {
    #[error("module not found")]
    NotFound,

    #[error("no version satisfies {range}")]
    VersionNotFound { range: String },

    #[error("registry unreachable: {0}")]
    RegistryUnavailable(String),

    #[error("unknown remote '{0}'")]
    UnknownRemote(String),

    #[error("singleton already active at {active}, requested {requested}")]
    SharedScopeConflict { active: Version, requested: String },

    #[error("still used by {}", .dependents.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", "))]
    InUse { dependents: Vec<ModuleRef> },

    #[error("not loaded")]
    NotLoaded,

    #[error("active instance changed: expected {expected}, found {found}")]
    StateChanged { expected: String, found: String },

    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("missing runtime capability '{0}'")]
    MissingCapability(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("registry error: {0}")]
    Registry(String),
}

impl FederationErrorKind {
    /// The classification fallback conditions match on.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotFound | Self::NotLoaded => FailureKind::ModuleNotFound,
            Self::VersionNotFound { .. } => FailureKind::VersionNotFound,
            Self::RegistryUnavailable(_) | Self::UnknownRemote(_) | Self::Registry(_) => {
                FailureKind::RegistryUnreachable
            }
            Self::SharedScopeConflict { .. } => FailureKind::SharedScopeConflict,
            Self::InUse { .. } => FailureKind::InUse,
            Self::Integrity(_) => FailureKind::IntegrityFailure,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::StateChanged { .. } | Self::MissingCapability(_) | Self::Invalid(_) => {
                FailureKind::Invalid
            }
        }
    }
}

impl From<&RegistryError> for FederationErrorKind {
    fn from(e: &RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => Self::NotFound,
            RegistryError::NoMatchingVersion { range, .. } => Self::VersionNotFound {
                range: range.clone(),
            },
            RegistryError::Unavailable(msg) => Self::RegistryUnavailable(msg.clone()),
            RegistryError::Artifact(ArtifactError::Unavailable(msg)) => {
                Self::RegistryUnavailable(msg.clone())
            }
            RegistryError::Artifact(ArtifactError::IntegrityMismatch { key, actual }) => {
                Self::Integrity(format!("artifact {} hashes to {}", key, actual))
            }
            RegistryError::Artifact(e @ ArtifactError::NotFound { .. }) => {
                Self::Integrity(e.to_string())
            }
            RegistryError::Timeout(d) => Self::Timeout(*d),
            RegistryError::Validation(msg) => Self::Invalid(msg.clone()),
            other => Self::Registry(other.to_string()),
        }
    }
}

impl From<VMogRegistryError> for FederationErrorKind {
    fn from(e: VMogRegistryError) -> Self {
        Self::from(e.kind())
    }
}

/// A federation failure with the module and requested version it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("federation of {module}@{requested} failed: {kind}")]
pub struct FederationError {
    pub module: ModuleKey,
    /// Requested version or range.
    pub requested: String,
    /// Registry or remote the failing lookup went to.
    pub source_name: Option<String>,
    #[source]
    pub kind: FederationErrorKind,
}

impl FederationError {
    pub fn new(module: ModuleKey, requested: impl Into<String>, kind: FederationErrorKind) -> Self {
        Self {
            module,
            requested: requested.into(),
            source_name: None,
            kind,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }

    pub fn failure_kind(&self) -> FailureKind {
        self.kind.failure_kind()
    }

    pub fn is_shared_scope_conflict(&self) -> bool {
        matches!(self.kind, FederationErrorKind::SharedScopeConflict { .. })
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, FederationError>;
