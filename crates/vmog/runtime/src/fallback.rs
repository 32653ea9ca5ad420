//! Fallback strategy selection.
//!
//! Selection is pure: it only filters and orders strategies. The runtime
//! applies the chosen actions one at a time, so a candidate that fails to
//! resolve leaves nothing behind.

use vmog_types::{FailureContext, FallbackStrategy};

/// Picks the fallback strategies applicable to a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackResolver;

impl FallbackResolver {
    /// Strategies whose conditions all hold for `failure`, lowest priority
    /// first. Equal priorities keep their declaration order.
    pub fn candidates<'a>(
        strategies: &'a [FallbackStrategy],
        failure: &FailureContext,
    ) -> Vec<&'a FallbackStrategy> {
        let mut matching: Vec<&FallbackStrategy> = strategies
            .iter()
            .filter(|s| s.applies_to(failure))
            .collect();
        matching.sort_by_key(|s| s.priority);
        matching
    }

    /// The first strategy to try, if any applies.
    pub fn select<'a>(
        strategies: &'a [FallbackStrategy],
        failure: &FailureContext,
    ) -> Option<&'a FallbackStrategy> {
        Self::candidates(strategies, failure).into_iter().next()
    }
}
