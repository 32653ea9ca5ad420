#![deny(unsafe_code)]
//! # vmog-types
//!
//! Shared vocabulary of the V-Mog registry: module identity, the persisted
//! record shapes and the fallback strategy model.
//!
//! ## Key Types
//!
//! - [`ModuleKey`] / [`ModuleRef`]: `namespace/name` and `namespace/name@version`
//! - [`FederatedModule`]: the published module record
//! - [`VMogRegistryEntry`]: the catalog record wrapping a published module
//! - [`FallbackStrategy`]: ordered recovery rule evaluated on resolution failure
//! - [`ContentHash`]: BLAKE3 content identity
//!
//! Records serialize with camelCase field names and ordered maps, so a
//! serialize → deserialize → serialize cycle is byte-identical.

pub mod entry;
pub mod error;
pub mod fallback;
pub mod hash;
pub mod ids;
pub mod module;
pub mod validation;

pub use entry::{BuildMetadata, EntryArtifacts, EntrySelector, EntryStatus, VMogRegistryEntry};
pub use error::{ContentHashError, IdentityError, ValidationError};
pub use fallback::{
    FailureContext, FailureKind, FallbackAction, FallbackCondition, FallbackStrategy, StrategyType,
};
pub use hash::ContentHash;
pub use ids::{ModuleKey, ModuleRef};
pub use module::{requirements_hash, ArtifactLocation, EntryPoint, FederatedModule, FederationConfig};
pub use validation::{validate_module, ValidationResult};

/// Namespace used when a publish request does not name one.
pub const DEFAULT_NAMESPACE: &str = "@team";
