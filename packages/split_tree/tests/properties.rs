use proptest::prelude::*;

use split_tree::{SplitNode, SplitTree, Time, TimesRecord, Timer, best_possible_time, sum_of_best};

fn opt_time(v: Option<u32>) -> Time {
    v.map(|v| Time::from_micros(u64::from(v)))
        .unwrap_or(Time::UNSET)
}

fn arb_node(best: impl Strategy<Value = Option<u32>> + 'static) -> impl Strategy<Value = SplitNode> {
    let leaf = (best, any::<Option<u32>>()).prop_map(|(best, pb)| {
        SplitNode::leaf_with_times(
            "leaf",
            TimesRecord {
                best_segment: opt_time(best),
                personal_best: opt_time(pb),
                ..Default::default()
            },
        )
    });
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop::collection::vec(inner, 1..4)
            .prop_map(|children| SplitNode::group("group", children).expect("children are non-empty"))
    })
}

fn arb_tree() -> impl Strategy<Value = SplitTree> {
    prop::collection::vec(arb_node(any::<Option<u32>>()), 0..6).prop_map(SplitTree::new)
}

/// Trees where every leaf has a best segment.
fn arb_complete_tree() -> impl Strategy<Value = SplitTree> {
    prop::collection::vec(arb_node((0..1_000_000u32).prop_map(Some)), 1..6).prop_map(SplitTree::new)
}

#[derive(Debug, Clone)]
enum Op {
    Start,
    Update(u32),
    Split,
    Reset,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Start),
        any::<u32>().prop_map(Op::Update),
        Just(Op::Split),
        Just(Op::Reset),
    ]
}

// --- Split tree and calculations ---

proptest! {
    #[test]
    fn leaf_ids_are_dense(tree in arb_tree()) {
        let ids: Vec<usize> = tree.leaves().map(|leaf| leaf.id()).collect();
        prop_assert_eq!(ids, (0..tree.len()).collect::<Vec<_>>());
    }

    #[test]
    fn sum_of_best_undefined_iff_any_best_unset(tree in arb_tree()) {
        let any_unset = tree.leaves().any(|leaf| leaf.times.best_segment.is_unset());
        prop_assert_eq!(sum_of_best(&tree).is_unset(), any_unset);
    }

    #[test]
    fn best_possible_equals_sum_of_best_before_run(tree in arb_tree()) {
        prop_assert_eq!(best_possible_time(&tree, None, Time::ZERO), sum_of_best(&tree));
    }

    #[test]
    fn best_possible_bounded_by_sum_of_best(
        tree in arb_complete_tree(),
        extras in prop::collection::vec(0..1_000_000u64, 64),
        completed in 0usize..64,
        partial in 0..2_000_000u64,
    ) {
        let mut timer = Timer::new(tree);
        let completed = completed % (timer.tree().len() + 1);
        let bests: Vec<Time> = timer.tree().leaves().map(|leaf| leaf.times.best_segment).collect();

        timer.start();
        let mut elapsed = 0u64;
        for (i, best) in bests.iter().take(completed).enumerate() {
            elapsed += best.raw() + extras[i % extras.len()];
            timer.update(Time::from_micros(elapsed));
            prop_assert!(!timer.split().gold);
        }
        timer.update(Time::from_micros(elapsed + partial));

        let sob = timer.sum_of_best();
        let bpt = timer.best_possible_time();
        prop_assert!(sob.is_set());
        prop_assert!(bpt >= sob, "{bpt} < {sob}");
    }

    #[test]
    fn resize_to_same_count_is_identity(tree in arb_tree()) {
        let mut resized = tree.clone();
        prop_assert!(!resized.resize(tree.len()));
        prop_assert_eq!(resized, tree);
    }

    #[test]
    fn resize_builds_fresh_flat_tree(tree in arb_tree(), n in 0usize..50) {
        let mut resized = tree.clone();
        let changed = resized.resize(n);
        prop_assert_eq!(changed, n != tree.len());
        prop_assert_eq!(resized.len(), n);
    }
}

// --- Timer state machine ---

proptest! {
    #[test]
    fn split_advances_or_finishes(tree in arb_tree(), ops in prop::collection::vec(arb_op(), 0..64)) {
        let mut timer = Timer::new(tree);
        let final_id = timer.tree().final_leaf().map(|leaf| leaf.id());
        for op in ops {
            match op {
                Op::Start => timer.start(),
                Op::Update(t) => timer.update(Time::from_micros(u64::from(t))),
                Op::Reset => {
                    timer.reset();
                }
                Op::Split => {
                    let before = timer.active();
                    let outcome = timer.split();
                    match before {
                        None => prop_assert_eq!(timer.active(), None),
                        Some(id) if Some(id) == final_id => {
                            prop_assert_eq!(timer.active(), None);
                            prop_assert!(outcome.finished.is_some());
                        }
                        Some(id) => {
                            prop_assert_eq!(timer.active(), Some(id + 1));
                            prop_assert!(outcome.finished.is_none());
                        }
                    }
                }
            }
            if let Some(id) = timer.active() {
                prop_assert!(timer.tree().leaf(id).is_some());
            }
        }
    }

    #[test]
    fn reset_clears_current_run(tree in arb_tree(), ops in prop::collection::vec(arb_op(), 0..64)) {
        let mut timer = Timer::new(tree);
        for op in ops {
            match op {
                Op::Start => timer.start(),
                Op::Update(t) => timer.update(Time::from_micros(u64::from(t))),
                Op::Split => {
                    timer.split();
                }
                Op::Reset => {
                    timer.reset();
                }
            }
        }
        timer.reset();
        prop_assert_eq!(timer.active(), None);
        for leaf in timer.tree().leaves() {
            prop_assert!(leaf.times.current.is_unset());
            prop_assert!(!leaf.times.golded_this_run);
        }
    }

    #[test]
    fn best_segments_never_increase(tree in arb_tree(), ops in prop::collection::vec(arb_op(), 0..64)) {
        let mut timer = Timer::new(tree);
        let mut bests: Vec<Time> = timer.tree().leaves().map(|leaf| leaf.times.best_segment).collect();
        for op in ops {
            match op {
                Op::Start => timer.start(),
                Op::Update(t) => timer.update(Time::from_micros(u64::from(t))),
                Op::Split => {
                    timer.split();
                }
                Op::Reset => {
                    timer.reset();
                }
            }
            let now: Vec<Time> = timer.tree().leaves().map(|leaf| leaf.times.best_segment).collect();
            for (old, new) in bests.iter().zip(&now) {
                prop_assert!(new <= old);
            }
            bests = now;
        }
    }
}
