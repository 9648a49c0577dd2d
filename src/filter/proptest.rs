//! Property-Based Tests for the Existence Filter
//!
//! 1. **No false negatives**: every added ID is reported present
//! 2. **Soundness**: IDs never added are reported absent (baseline sizing,
//!    small universes, where a false positive is astronomically unlikely)
//! 3. **Offset range**: every derived offset is below the bit width

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use super::{ExistenceFilter, FilterSizing};
use crate::adapters::InMemoryKvStore;
use crate::config::Keyspace;

const KEY: &str = "bloom:prop";

fn id_set_strategy() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set("[a-z0-9]{1,12}", 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every added ID is reported present.
    #[test]
    fn prop_no_false_negatives(ids in id_set_strategy()) {
        let filter = ExistenceFilter::with_defaults(Arc::new(InMemoryKvStore::new()));
        tokio_test::block_on(async {
            filter.add_batch(KEY, &ids).await.unwrap();
            for id in &ids {
                assert!(filter.might_contain(KEY, id).await, "false negative for {}", id);
            }
        });
    }

    /// Property: IDs outside the added set are reported absent.
    #[test]
    fn prop_never_added_is_absent(
        added in id_set_strategy(),
        probes in id_set_strategy(),
    ) {
        let filter = ExistenceFilter::with_defaults(Arc::new(InMemoryKvStore::new()));
        tokio_test::block_on(async {
            filter.add_batch(KEY, &added).await.unwrap();
            for probe in probes.difference(&added) {
                assert!(!filter.might_contain(KEY, probe).await, "unexpected hit for {}", probe);
            }
        });
    }

    /// Property: derived offsets stay within the configured width.
    #[test]
    fn prop_offsets_in_range(
        id in "[ -~]{0,32}",
        width in 3u64..100_000,
        hashes in 3u32..=8,
    ) {
        let sizing = FilterSizing::new(width, hashes).unwrap();
        let filter = ExistenceFilter::new(
            Arc::new(InMemoryKvStore::new()),
            Keyspace::default(),
            sizing,
        );
        let offsets = filter.bit_offsets(&id);
        prop_assert_eq!(offsets.len(), hashes as usize);
        prop_assert!(offsets.iter().all(|&o| o < width));
    }
}
