use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use vmog_types::{ModuleKey, ModuleRef};

/// Phase of a module's swap state machine.
///
/// ```text
/// Idle → Validating → Staging → Swapping → Verifying → Committed → Idle
///                                   ↘ (failure) → RollingBack → Idle
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapPhase {
    #[default]
    Idle,
    Validating,
    Staging,
    Swapping,
    Verifying,
    Committed,
    RollingBack,
}

impl SwapPhase {
    /// Phases in which `cancel` is accepted.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Validating | Self::Staging)
    }

    /// Whether a swap occupies the module.
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Staging => "staging",
            Self::Swapping => "swapping",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::RollingBack => "rolling-back",
        };
        f.write_str(name)
    }
}

/// Current state of a module's swap slot, as reported by `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStatus {
    pub module: ModuleKey,
    pub phase: SwapPhase,
    pub from_version: Option<Version>,
    pub to_version: Option<Version>,
    /// Transitive dependents of the version being replaced.
    pub impacted: Vec<ModuleRef>,
    /// Set while a failed verification waits for `commit` or `rollback`.
    pub awaiting_decision: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Reason the most recent swap of this module did not commit.
    pub last_error: Option<String>,
}

impl SwapStatus {
    pub fn idle(module: ModuleKey) -> Self {
        Self {
            module,
            phase: SwapPhase::Idle,
            from_version: None,
            to_version: None,
            impacted: Vec::new(),
            awaiting_decision: false,
            started_at: None,
            last_error: None,
        }
    }
}

/// Outcome of a committed swap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapReport {
    pub module: ModuleKey,
    pub from_version: Version,
    pub to_version: Version,
    pub impacted: Vec<ModuleRef>,
    /// Incompatibilities overridden by `force`.
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
