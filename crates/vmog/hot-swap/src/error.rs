use crate::types::SwapPhase;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use vmog_registry::VMogRegistryError;
use vmog_types::ModuleKey;

/// What happened to the pre-swap state after a failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RollbackOutcome {
    /// The failure happened before anything visible changed.
    NotRequired,
    /// The previous version is active again.
    RolledBack { restored: Version },
    /// `rollback_on_failure` was off; the new version stays active until
    /// the operator commits or rolls back.
    AwaitingDecision,
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => f.write_str("nothing to roll back"),
            Self::RolledBack { restored } => write!(f, "rolled back to {}", restored),
            Self::AwaitingDecision => f.write_str("awaiting manual decision"),
        }
    }
}

/// A swap that failed after validation, with the stage it failed in and
/// the state it left behind.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("hot swap of {module} {from_version} -> {to_version} failed while {stage}: {reason} ({rollback})")]
pub struct HotSwapError {
    pub module: ModuleKey,
    pub from_version: Version,
    pub to_version: Version,
    pub stage: SwapPhase,
    pub reason: String,
    pub rollback: RollbackOutcome,
}

impl HotSwapError {
    pub fn was_rolled_back(&self) -> bool {
        matches!(self.rollback, RollbackOutcome::RolledBack { .. })
    }
}

/// Errors from the hot-swap control surface.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("swap of {module} already in progress ({phase})")]
    InProgress { module: ModuleKey, phase: SwapPhase },

    #[error("swap of {module} rejected: {reason}")]
    Validation { module: ModuleKey, reason: String },

    #[error(transparent)]
    Failed(#[from] HotSwapError),

    #[error("swap of {module} cancelled while {phase}")]
    Cancelled { module: ModuleKey, phase: SwapPhase },

    #[error("swap of {module} cannot be cancelled while {phase}")]
    NotCancellable { module: ModuleKey, phase: SwapPhase },

    #[error("swap task of {0} was aborted")]
    Aborted(ModuleKey),

    #[error("no swap of {0} is awaiting a decision")]
    NoPendingDecision(ModuleKey),

    #[error(transparent)]
    Registry(#[from] VMogRegistryError),
}

impl SwapError {
    pub fn validation(module: &ModuleKey, reason: impl Into<String>) -> Self {
        Self::Validation {
            module: module.clone(),
            reason: reason.into(),
        }
    }

    /// The stage failure, if the swap got past validation.
    pub fn hot_swap(&self) -> Option<&HotSwapError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SwapError>;
