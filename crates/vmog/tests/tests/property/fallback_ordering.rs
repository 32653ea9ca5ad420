//! Property tests: fallback selection depends only on priorities and
//! conditions, never on declaration order.

use proptest::prelude::*;
use vmog_runtime::FallbackResolver;
use vmog_types::{FailureContext, FailureKind, FallbackStrategy, ModuleKey};

fn arb_failure_kind() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::ModuleNotFound),
        Just(FailureKind::VersionNotFound),
        Just(FailureKind::RegistryUnreachable),
        Just(FailureKind::IntegrityFailure),
        Just(FailureKind::Timeout),
    ]
}

/// Strategies with a distinct graceful message each, so they can be told
/// apart after reordering.
fn arb_strategies() -> impl Strategy<Value = Vec<FallbackStrategy>> {
    prop::collection::vec((0u32..10, arb_failure_kind()), 0..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (priority, kind))| {
                FallbackStrategy::graceful(priority, format!("s{}", i)).when_failure(kind)
            })
            .collect()
    })
}

fn failure(kind: FailureKind) -> FailureContext {
    FailureContext::new(kind, ModuleKey::new("acme", "widgets"), "^2.0.0")
}

proptest! {
    /// Candidates are exactly the matching strategies, in non-decreasing
    /// priority, ties in declaration order.
    #[test]
    fn candidates_are_matching_and_sorted(
        strategies in arb_strategies(),
        kind in arb_failure_kind(),
    ) {
        let ctx = failure(kind);
        let candidates = FallbackResolver::candidates(&strategies, &ctx);

        let matching = strategies.iter().filter(|s| s.applies_to(&ctx)).count();
        prop_assert_eq!(candidates.len(), matching);
        prop_assert!(candidates.iter().all(|s| s.applies_to(&ctx)));
        for pair in candidates.windows(2) {
            prop_assert!(pair[0].priority <= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                let pos = |s: &FallbackStrategy| strategies.iter().position(|x| x == s);
                prop_assert!(pos(pair[0]) < pos(pair[1]));
            }
        }
    }

    /// The selected strategy is the lowest-priority match whatever the
    /// list order.
    #[test]
    fn selection_ignores_declaration_order(
        strategies in arb_strategies(),
        kind in arb_failure_kind(),
        seed in any::<u64>(),
    ) {
        let ctx = failure(kind);
        let mut shuffled = strategies.clone();
        let len = shuffled.len().max(1);
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        let best = |list: &[FallbackStrategy]| {
            FallbackResolver::select(list, &ctx).map(|s| s.priority)
        };
        prop_assert_eq!(best(&strategies), best(&shuffled));
        let expected = strategies
            .iter()
            .filter(|s| s.applies_to(&ctx))
            .map(|s| s.priority)
            .min();
        prop_assert_eq!(best(&strategies), expected);
    }
}

#[test]
fn priorities_two_one_three_pick_the_only_match() {
    let strategies = vec![
        FallbackStrategy::version(2, "^1").when_failure(FailureKind::RegistryUnreachable),
        FallbackStrategy::version(1, "^1.2").when_failure(FailureKind::VersionNotFound),
        FallbackStrategy::version(3, "^1.4").when_failure(FailureKind::Timeout),
    ];
    let chosen = FallbackResolver::select(&strategies, &failure(FailureKind::VersionNotFound))
        .unwrap();
    assert_eq!(chosen.priority, 1);
}
