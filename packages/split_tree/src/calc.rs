//! Aggregate predictions over a split tree.
//!
//! Both folds propagate "undefined": if any contributing value is unset the
//! result is [`Time::UNSET`].

use serde::Serialize;

use crate::time::{Delta, Time};
use crate::tree::{Leaf, SplitNode, SplitTree};

/// Finish time if every split matched its best segment.
pub fn sum_of_best(tree: &SplitTree) -> Time {
    sum_nodes(tree.nodes(), &mut |leaf: &Leaf| leaf.times.best_segment)
}

/// Tightest achievable finish time given what has happened in the current run.
///
/// Completed splits contribute the segment they actually took. The active
/// split contributes at least its best segment, or the time already spent on
/// it if that is longer. Everything after contributes its best segment.
pub fn best_possible_time(tree: &SplitTree, active: Option<usize>, segment_elapsed: Time) -> Time {
    // Leaves are visited in id order, so the previous leaf's cumulative time
    // is carried along instead of looked up.
    let mut previous = Time::ZERO;
    sum_nodes(tree.nodes(), &mut |leaf: &Leaf| {
        let value = if active == Some(leaf.id()) {
            leaf.times.best_segment.max(segment_elapsed)
        } else if leaf.times.current.is_set() {
            leaf.times.current.saturating_sub(previous)
        } else {
            leaf.times.best_segment
        };
        previous = leaf.times.current;
        value
    })
}

fn sum_nodes(nodes: &[SplitNode], leaf_value: &mut impl FnMut(&Leaf) -> Time) -> Time {
    let mut sum = Time::ZERO;
    for node in nodes {
        let value = match node {
            SplitNode::Group(group) => sum_nodes(group.children(), leaf_value),
            SplitNode::Leaf(leaf) => leaf_value(leaf),
        };
        if value.is_unset() {
            return Time::UNSET;
        }
        sum = sum.checked_add(value);
    }
    sum
}

/// How a row compares against the personal best.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Not reached in this run yet.
    Pending,
    /// Reached, but there is nothing to compare against.
    NoComparison,
    /// The split beat its best segment this run.
    Gold,
    Ahead,
    Behind,
}

/// Live comparison of one row (leaf or group) against its personal best.
pub fn compare(node: &SplitNode) -> (Option<Delta>, RowStatus) {
    let times = node.times();
    let delta = Delta::between(times.current, times.personal_best);
    let status = if times.current.is_unset() {
        RowStatus::Pending
    } else if times.golded_this_run && matches!(node, SplitNode::Leaf(_)) {
        RowStatus::Gold
    } else {
        match delta {
            None => RowStatus::NoComparison,
            Some(Delta::Ahead(_)) => RowStatus::Ahead,
            Some(Delta::Behind(_)) => RowStatus::Behind,
        }
    };
    (delta, status)
}
