#![deny(unsafe_code)]
//! # vmog-runtime
//!
//! The federation runtime: resolves module requests to loaded instances
//! across a shared dependency scope.
//!
//! ## Resolution
//!
//! ```text
//! request ─► active instance? ─► registry lookup ─► artifact ─► install
//!                 │                     │
//!                 ▼                     ▼
//!        singleton conflict       FallbackResolver
//! ```
//!
//! A `singleton` module has exactly one active version per runtime; a
//! request for an incompatible version fails with a shared scope conflict.
//! Other modules get a private instance when the active one does not fit.
//!
//! ## Key Types
//!
//! - [`FederationRuntime`]: resolution, bootstrap, unload and swap support
//! - [`ModuleSource`]: a registry or remote modules are loaded from
//! - [`FallbackResolver`]: priority-ordered strategy selection
//! - [`RuntimeSnapshot`]: exportable view of the active state

pub mod config;
pub mod error;
pub mod fallback;
pub mod module;
pub mod runtime;
pub mod snapshot;
pub mod source;

pub use config::RuntimeConfig;
pub use error::{FederationError, FederationErrorKind, Result};
pub use fallback::FallbackResolver;
pub use module::{LoadedModule, ModuleRequest, RequesterContext, Resolution};
pub use runtime::{BootstrapReport, FederationRuntime, RuntimeState};
pub use snapshot::{RuntimeSnapshot, SnapshotModule};
pub use source::{ModuleSource, RegistrySource};
