#![deny(unsafe_code)]
//! # vmog-hot-swap
//!
//! Replaces the active version of a module in a running
//! [`FederationRuntime`](vmog_runtime::FederationRuntime) without a
//! serving gap, verifying the new version and restoring the old one when
//! verification fails.
//!
//! ## Phases
//!
//! ```text
//! Idle → Validating → Staging → Swapping → Verifying → Committed → Idle
//!                                   ↘ (failure) → RollingBack → Idle
//! ```
//!
//! - **Validating**: target published and not archived, compatible with
//!   the shared scope and with every loaded dependent
//! - **Staging**: target loaded side by side, invisible to resolution
//! - **Swapping**: one atomic store repoints the active instance
//! - **Verifying**: health check bounded by the verify timeout
//!
//! At most one swap per module is in flight; swaps of distinct modules run
//! in parallel.

pub mod config;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod types;

pub use config::{HotSwapConfig, SwapOptions};
pub use error::{HotSwapError, Result, RollbackOutcome, SwapError};
pub use health::{EntryPointCheck, HealthCheck, HealthStatus, SimulatedHealthCheck};
pub use orchestrator::HotSwapOrchestrator;
pub use types::{SwapPhase, SwapReport, SwapStatus};
