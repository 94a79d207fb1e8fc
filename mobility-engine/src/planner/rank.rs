//! Bundle ranking for search results.
//!
//! Orders bundles so the most useful options come first and removes
//! repeats and options that are clearly worse than another.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::score::Bundle;

/// Rank bundles best-first.
///
/// Bundles are ordered by score, highest first. Equal scores fall back to
/// bundle id so the order is deterministic.
pub fn rank_bundles(mut bundles: Vec<Bundle>) -> Vec<Bundle> {
    bundles.sort_by(compare);
    bundles
}

fn compare(a: &Bundle, b: &Bundle) -> Ordering {
    b.score()
        .total_cmp(&a.score())
        .then_with(|| a.id().cmp(b.id()))
}

fn dominates(a: &Bundle, b: &Bundle) -> bool {
    a.discounted_price() <= b.discounted_price()
        && a.arrive() <= b.arrive()
        && a.transfers() <= b.transfers()
        // Must be strictly better in at least one dimension
        && (a.discounted_price() < b.discounted_price()
            || a.arrive() < b.arrive()
            || a.transfers() < b.transfers())
}

/// Remove dominated bundles.
///
/// A bundle is dominated if another bundle costs no more, arrives no later
/// and has no more transfers, and is strictly better on one of those.
pub fn remove_dominated(bundles: Vec<Bundle>) -> Vec<Bundle> {
    if bundles.len() <= 1 {
        return bundles;
    }

    let mut result: Vec<Bundle> = Vec::with_capacity(bundles.len());

    for bundle in bundles {
        if result.iter().any(|existing| dominates(existing, &bundle)) {
            continue;
        }
        // Also remove any kept bundles dominated by this one
        result.retain(|existing| !dominates(&bundle, existing));
        result.push(bundle);
    }

    result
}

/// Keep the first bundle seen for each bundle id.
pub fn deduplicate(bundles: Vec<Bundle>) -> Vec<Bundle> {
    let mut seen = HashSet::with_capacity(bundles.len());
    bundles
        .into_iter()
        .filter(|b| seen.insert(b.id().clone()))
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::domain::{Point, Segment, SegmentDraft, Tick};
    use crate::planner::ScoreConfig;
    use proptest::prelude::*;

    fn make_segment(id: String, depart: i64, duration: i64, price: u16) -> Segment {
        SegmentDraft::offer(id, "prov", Point::new(0.0, 0.0), Point::new(5.0, 0.0))
            .times(Tick::new(depart), Tick::new(depart + duration))
            .price(f64::from(price))
            .build()
            .unwrap()
    }

    /// Strategy for a bundle of one or two segments.
    fn bundle_strategy() -> impl Strategy<Value = Bundle> {
        (
            0u32..30,        // id
            0i64..50,        // depart
            1i64..30,        // duration
            0u16..20,        // price
            prop::option::of((0i64..10, 1i64..30, 0u16..20)),
        )
            .prop_map(|(id, depart, duration, price, second)| {
                let mut segments = vec![make_segment(format!("s{id}"), depart, duration, price)];
                if let Some((wait, d2, p2)) = second {
                    let start = depart + duration + wait;
                    segments.push(make_segment(format!("t{id}"), start, d2, p2));
                }
                Bundle::new(segments, Tick::new(0), &ScoreConfig::default()).unwrap()
            })
    }

    fn bundles_strategy() -> impl Strategy<Value = Vec<Bundle>> {
        prop::collection::vec(bundle_strategy(), 0..15)
    }

    proptest! {
        #[test]
        fn rank_bundles_is_sorted(bundles in bundles_strategy()) {
            let ranked = rank_bundles(bundles);

            for window in ranked.windows(2) {
                let (a, b) = (&window[0], &window[1]);
                prop_assert!(
                    a.score() > b.score() || (a.score() == b.score() && a.id() <= b.id()),
                    "Not sorted: {} ({}) before {} ({})",
                    a.id(),
                    a.score(),
                    b.id(),
                    b.score()
                );
            }
        }

        #[test]
        fn rank_bundles_preserves_elements(bundles in bundles_strategy()) {
            let original_len = bundles.len();
            prop_assert_eq!(rank_bundles(bundles).len(), original_len);
        }

        #[test]
        fn remove_dominated_no_internal_domination(bundles in bundles_strategy()) {
            let result = remove_dominated(bundles);

            for (i, a) in result.iter().enumerate() {
                for (j, b) in result.iter().enumerate() {
                    if i != j {
                        prop_assert!(!dominates(a, b), "Bundle {} dominates bundle {}", i, j);
                    }
                }
            }
        }

        #[test]
        fn deduplicate_leaves_unique_ids(bundles in bundles_strategy()) {
            let original_len = bundles.len();
            let result = deduplicate(bundles);

            let unique: HashSet<_> = result.iter().map(|b| b.id().clone()).collect();
            prop_assert_eq!(unique.len(), result.len());
            prop_assert!(result.len() <= original_len);
        }
    }

    // Make sure the strategy actually produces dominated bundles.
    #[test]
    fn remove_dominated_distribution() {
        use proptest::test_runner::{Config, TestRunner};
        use std::cell::Cell;

        let mut runner = TestRunner::new(Config::with_cases(500));
        let removed = Cell::new(0u32);
        let total = Cell::new(0u32);

        let _ = runner.run(&bundles_strategy(), |bundles| {
            let original_len = bundles.len();
            if remove_dominated(bundles).len() < original_len {
                removed.set(removed.get() + 1);
            }
            total.set(total.get() + 1);
            Ok(())
        });

        assert!(
            removed.get() > 0 || total.get() < 10,
            "Never removed dominated bundles in {} tests",
            total.get()
        );
    }
}
