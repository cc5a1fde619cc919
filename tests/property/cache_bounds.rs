//! Property-based tests for the bounded suggestion cache

use proptest::prelude::*;
use std::collections::VecDeque;
use tabmind::suggestions::{CacheConfig, Fingerprint, SuggestionCache};

fn triple(key: &str) -> [String; 3] {
    [format!("{} a", key), format!("{} b", key), format!("{} c", key)]
}

/// Test that the cache never exceeds its bound and evicts in insertion order
#[test]
fn test_cache_matches_fifo_model() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(1usize..12, prop::collection::vec(0u8..24, 0..80)),
            |(capacity, inserts)| {
                let cache = SuggestionCache::new(&CacheConfig { capacity });
                let mut model: VecDeque<Fingerprint> = VecDeque::new();

                for n in inserts {
                    let key = Fingerprint::from(format!("key-{}", n));
                    cache.insert(key.clone(), triple(key.as_str()));

                    if !model.contains(&key) {
                        model.push_back(key);
                        if model.len() > capacity {
                            model.pop_front();
                        }
                    }

                    prop_assert!(cache.len() <= capacity);
                }

                prop_assert_eq!(cache.keys(), model.iter().cloned().collect::<Vec<_>>());
                Ok(())
            },
        )
        .unwrap();
}

proptest! {
    #[test]
    fn first_insert_wins(first in "[a-z]{1,8}", second in "[a-z]{1,8}") {
        let cache = SuggestionCache::new(&CacheConfig::default());
        let key = Fingerprint::from("same");

        cache.insert(key.clone(), triple(&first));
        let kept = cache.insert(key.clone(), triple(&second));

        prop_assert_eq!(&kept, &triple(&first));
        prop_assert_eq!(cache.get(&key), Some(triple(&first)));
        prop_assert_eq!(cache.len(), 1);
    }
}
