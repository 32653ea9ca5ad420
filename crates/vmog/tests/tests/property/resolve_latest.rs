//! Property tests: `resolve_latest` is deterministic and picks the highest
//! non-archived version in range.

use proptest::prelude::*;
use semver::{Version, VersionReq};
use std::collections::BTreeSet;
use vmog_registry::{RegistryConfig, VMogRegistry};
use vmog_tests::{module, try_publish};

fn arb_versions() -> impl Strategy<Value = BTreeSet<(u64, u64, u64)>> {
    prop::collection::btree_set((0u64..4, 0u64..4, 0u64..4), 1..12)
}

fn arb_range() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (0u64..4).prop_map(|m| format!("^{}", m)),
        (0u64..4, 0u64..4).prop_map(|(m, n)| format!("~{}.{}", m, n)),
        (0u64..4, 0u64..4).prop_map(|(m, n)| format!(">={}.{}, <3", m, n)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn latest_is_deterministic_and_maximal(
        versions in arb_versions(),
        archived_mask in any::<u16>(),
        range in arb_range(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let registry = VMogRegistry::in_memory(RegistryConfig {
                deprecate_superseded: false,
                ..RegistryConfig::default()
            });
            let mut archived = BTreeSet::new();
            for (i, (major, minor, patch)) in versions.iter().enumerate() {
                let version = format!("{}.{}.{}", major, minor, patch);
                try_publish(&registry, module("acme", "widgets", &version)).await.unwrap();
                if archived_mask & (1 << i) != 0 {
                    let parsed = Version::new(*major, *minor, *patch);
                    registry.archive("acme", "widgets", &parsed).await.unwrap();
                    archived.insert(parsed);
                }
            }

            let req = VersionReq::parse(&range).unwrap();
            let expected = versions
                .iter()
                .map(|(a, b, c)| Version::new(*a, *b, *c))
                .filter(|v| !archived.contains(v) && req.matches(v))
                .max();

            let first = registry.resolve_latest("acme", "widgets", &req).await.ok().map(|e| e.version);
            let second = registry.resolve_latest("acme", "widgets", &req).await.ok().map(|e| e.version);
            assert_eq!(first, second);
            assert_eq!(first, expected);
        });
    }
}
