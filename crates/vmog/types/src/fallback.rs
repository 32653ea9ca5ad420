//! Fallback strategies
//!
//! A failed resolution is described by a [`FailureContext`]. Each strategy
//! carries a list of [`FallbackCondition`]s (all must hold; an empty list
//! always holds) and an [`FallbackAction`] whose variant must agree with
//! the strategy's `type`.

use crate::ids::ModuleKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four strategy families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyType {
    /// Retry against an alternate version range.
    Version,
    /// Retry against an alternate registry or remote.
    Registry,
    /// Substitute a different module.
    Implementation,
    /// Return a degraded stub instead of failing.
    Graceful,
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => write!(f, "version"),
            Self::Registry => write!(f, "registry"),
            Self::Implementation => write!(f, "implementation"),
            Self::Graceful => write!(f, "graceful"),
        }
    }
}

/// Classification of a resolution failure, the vocabulary conditions match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ModuleNotFound,
    VersionNotFound,
    RegistryUnreachable,
    IntegrityFailure,
    SharedScopeConflict,
    InUse,
    Timeout,
    Invalid,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ModuleNotFound => "module not found",
            Self::VersionNotFound => "version not found",
            Self::RegistryUnreachable => "registry unreachable",
            Self::IntegrityFailure => "integrity failure",
            Self::SharedScopeConflict => "shared scope conflict",
            Self::InUse => "in use",
            Self::Timeout => "timeout",
            Self::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// What went wrong, as seen by the fallback resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureContext {
    pub kind: FailureKind,
    pub module: ModuleKey,
    /// The version range that was requested.
    pub requested: String,
    /// The registry or remote that was consulted.
    pub source: Option<String>,
}

impl FailureContext {
    pub fn new(kind: FailureKind, module: ModuleKey, requested: impl Into<String>) -> Self {
        Self {
            kind,
            module,
            requested: requested.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Predicate over a [`FailureContext`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "camelCase")]
pub enum FallbackCondition {
    /// Always holds.
    Always,
    /// The failure is of exactly this kind.
    Failure { kind: FailureKind },
    /// The failure is any of these kinds.
    FailureIn { kinds: Vec<FailureKind> },
    /// The caller requested exactly this range.
    Requested { range: String },
    /// The failing lookup went to this registry or remote.
    Source { name: String },
}

impl FallbackCondition {
    pub fn matches(&self, ctx: &FailureContext) -> bool {
        match self {
            Self::Always => true,
            Self::Failure { kind } => ctx.kind == *kind,
            Self::FailureIn { kinds } => kinds.contains(&ctx.kind),
            Self::Requested { range } => ctx.requested.trim() == range.trim(),
            Self::Source { name } => ctx.source.as_deref() == Some(name.as_str()),
        }
    }
}

/// Strategy-specific payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FallbackAction {
    Version {
        range: String,
    },
    Registry {
        registry: String,
    },
    Implementation {
        namespace: String,
        name: String,
        range: String,
    },
    Graceful {
        #[serde(default)]
        message: String,
    },
}

impl FallbackAction {
    pub fn strategy_type(&self) -> StrategyType {
        match self {
            Self::Version { .. } => StrategyType::Version,
            Self::Registry { .. } => StrategyType::Registry,
            Self::Implementation { .. } => StrategyType::Implementation,
            Self::Graceful { .. } => StrategyType::Graceful,
        }
    }
}

/// One entry of a module's `fallbackStrategies` list. Lower `priority` is tried first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackStrategy {
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    pub priority: u32,
    #[serde(default)]
    pub conditions: Vec<FallbackCondition>,
    pub action: FallbackAction,
}

impl FallbackStrategy {
    fn from_action(priority: u32, action: FallbackAction) -> Self {
        Self {
            strategy_type: action.strategy_type(),
            priority,
            conditions: Vec::new(),
            action,
        }
    }

    pub fn version(priority: u32, range: impl Into<String>) -> Self {
        Self::from_action(
            priority,
            FallbackAction::Version {
                range: range.into(),
            },
        )
    }

    pub fn registry(priority: u32, registry: impl Into<String>) -> Self {
        Self::from_action(
            priority,
            FallbackAction::Registry {
                registry: registry.into(),
            },
        )
    }

    pub fn implementation(
        priority: u32,
        namespace: impl Into<String>,
        name: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self::from_action(
            priority,
            FallbackAction::Implementation {
                namespace: namespace.into(),
                name: name.into(),
                range: range.into(),
            },
        )
    }

    pub fn graceful(priority: u32, message: impl Into<String>) -> Self {
        Self::from_action(
            priority,
            FallbackAction::Graceful {
                message: message.into(),
            },
        )
    }

    pub fn when(mut self, condition: FallbackCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn when_failure(self, kind: FailureKind) -> Self {
        self.when(FallbackCondition::Failure { kind })
    }

    /// All conditions hold for `ctx`. Pure.
    pub fn applies_to(&self, ctx: &FailureContext) -> bool {
        self.conditions.iter().all(|c| c.matches(ctx))
    }

    /// The declared `type` agrees with the action payload.
    pub fn is_consistent(&self) -> bool {
        self.strategy_type == self.action.strategy_type()
    }
}
