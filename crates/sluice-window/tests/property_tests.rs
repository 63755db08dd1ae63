//! Property tests for sluice-window
//!
//! Invariants of the window value type and the merge scan.

use proptest::prelude::*;
use sluice_window::{merge_groups, Window};

fn arb_window() -> impl Strategy<Value = Window> {
    (-100_000i64..100_000, 1i64..50_000).prop_map(|(start, len)| Window::new(start, start + len))
}

proptest! {
    /// max_timestamp is always the last contained timestamp
    #[test]
    fn prop_max_timestamp_contained(w in arb_window()) {
        prop_assert!(w.contains(w.max_timestamp()));
        prop_assert!(!w.contains(w.max_timestamp() + 1));
    }

    /// cover contains both operands
    #[test]
    fn prop_cover_contains_both(a in arb_window(), b in arb_window()) {
        let c = a.cover(&b);
        prop_assert!(c.start() <= a.start() && c.end() >= a.end());
        prop_assert!(c.start() <= b.start() && c.end() >= b.end());
    }

    /// intersects is symmetric
    #[test]
    fn prop_intersects_symmetric(a in arb_window(), b in arb_window()) {
        prop_assert_eq!(a.intersects(&b), b.intersects(&a));
    }

    /// every merge group's members intersect the merged result, and the
    /// merged window covers exactly the span of its members
    #[test]
    fn prop_merge_groups_cover_members(windows in proptest::collection::vec(arb_window(), 0..20)) {
        for (members, merged) in merge_groups(&windows) {
            prop_assert!(members.len() > 1);
            let mut span = members[0];
            for m in &members {
                prop_assert!(m.intersects(&merged));
                span = span.cover(m);
            }
            prop_assert_eq!(span, merged);
        }
    }

    /// merged results of distinct groups never intersect each other
    #[test]
    fn prop_merge_results_disjoint(windows in proptest::collection::vec(arb_window(), 0..20)) {
        let groups = merge_groups(&windows);
        for (i, (_, a)) in groups.iter().enumerate() {
            for (_, b) in groups.iter().skip(i + 1) {
                prop_assert!(!a.intersects(b));
            }
        }
    }

    /// merging is idempotent over already-merged results
    #[test]
    fn prop_merge_idempotent(windows in proptest::collection::vec(arb_window(), 0..20)) {
        let merged: Vec<Window> = merge_groups(&windows).into_iter().map(|(_, m)| m).collect();
        prop_assert!(merge_groups(&merged).is_empty());
    }
}
