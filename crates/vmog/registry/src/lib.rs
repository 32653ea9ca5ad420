#![deny(unsafe_code)]
//! # vmog-registry
//!
//! The V-Mog registry: a versioned, content-addressed catalog of federated
//! module artifacts.
//!
//! ## Architecture
//!
//! ```text
//! publish ─► validate ─► ArtifactStore (content) ─► RegistryStore (metadata)
//!                                                        │
//!                                                        ▼
//!                                                 DependencyGraph
//! ```
//!
//! The catalog record is the commit point: artifact bytes are written first
//! under their content hash, so an abandoned publish leaves at most an
//! unreferenced blob behind.
//!
//! ## Key Types
//!
//! - [`VMogRegistry`]: publish, lookup, lifecycle and impact analysis
//! - [`RegistryStore`]: pluggable catalog backend with optimistic writes
//! - [`ArtifactStore`]: content-addressed blob storage
//! - [`DependencyGraph`]: forward and reverse dependency edges
//! - [`RetryPolicy`]: bounded exponential backoff for transient failures

pub mod artifact;
pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod retry;
pub mod store;

pub use artifact::{content_key, ArtifactStore, CachedArtifactStore, InMemoryArtifactStore};
pub use config::{BackoffConfig, RegistryConfig};
pub use error::{ArtifactError, RegistryError, Result, StoreError, VMogRegistryError};
pub use graph::{DependencyGraph, DependentsNode};
pub use registry::{PublishRequest, VMogRegistry};
pub use retry::RetryPolicy;
pub use store::{InMemoryRegistryStore, RegistryStore};
