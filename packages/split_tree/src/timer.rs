//! Per-session timer state machine.
//!
//! The timer is either idle (no active leaf) or running (the active leaf is
//! the split currently being timed). Transitions only mutate the tree's
//! current-run fields; persistence is left to the caller, which reacts to
//! the [`SplitOutcome`] returned by [`Timer::split`].

use chrono::{DateTime, Local};
use tracing::debug;

use crate::calc;
use crate::error::TreeError;
use crate::time::Time;
use crate::tree::SplitTree;

/// A new segment only counts as gold when it beats the previous best by
/// more than this many microseconds.
pub const GOLD_EPSILON: u64 = 10;

/// A run that just completed on the final split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFinish {
    pub final_time: Time,
    /// The final time beat the stored personal best.
    pub personal_best: bool,
    pub started_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitOutcome {
    /// The split set a new best segment.
    pub gold: bool,
    pub finished: Option<RunFinish>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    tree: SplitTree,
    active: Option<usize>,
    elapsed: Time,
    segment_elapsed: Time,
    run_started: Option<DateTime<Local>>,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(SplitTree::default())
    }
}

impl Timer {
    pub fn new(tree: SplitTree) -> Self {
        Self {
            tree,
            active: None,
            elapsed: Time::ZERO,
            segment_elapsed: Time::ZERO,
            run_started: None,
        }
    }

    pub fn tree(&self) -> &SplitTree {
        &self.tree
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn elapsed(&self) -> Time {
        self.elapsed
    }

    pub fn segment_elapsed(&self) -> Time {
        self.segment_elapsed
    }

    pub fn run_started(&self) -> Option<DateTime<Local>> {
        self.run_started
    }

    pub fn sum_of_best(&self) -> Time {
        calc::sum_of_best(&self.tree)
    }

    pub fn best_possible_time(&self) -> Time {
        calc::best_possible_time(&self.tree, self.active, self.segment_elapsed)
    }

    /// Swap in a new tree. Forces idle and zeroes the counters.
    pub fn replace_tree(&mut self, tree: SplitTree) -> SplitTree {
        let old = std::mem::replace(&mut self.tree, tree);
        self.go_idle();
        self.elapsed = Time::ZERO;
        self.segment_elapsed = Time::ZERO;
        old
    }

    /// Rebuild as `n` flat leaves. Returns `false` if the tree already had
    /// exactly `n` leaves, in which case nothing changes.
    pub fn resize(&mut self, n: usize) -> bool {
        if !self.tree.resize(n) {
            return false;
        }
        self.go_idle();
        self.elapsed = Time::ZERO;
        self.segment_elapsed = Time::ZERO;
        true
    }

    pub fn rename(&mut self, id: usize, name: impl Into<String>) -> Result<(), TreeError> {
        self.tree.rename(id, name)
    }

    pub fn start(&mut self) {
        if self.is_running() || self.tree.is_empty() {
            return;
        }
        self.active = Some(0);
        self.run_started = Some(Local::now());
        self.segment_elapsed = self.elapsed;
        self.tree.update_expanded(self.active);
        debug!(leaves = self.tree.len(), "run started");
    }

    pub fn update(&mut self, elapsed: Time) {
        self.elapsed = elapsed;
        let previous = match self.active {
            Some(id) => self.tree.previous_current(id),
            None => Time::ZERO,
        };
        self.segment_elapsed = elapsed.saturating_sub(previous);
    }

    /// Complete the active split. Does nothing while idle.
    pub fn split(&mut self) -> SplitOutcome {
        let Some(id) = self.active else {
            return SplitOutcome::default();
        };
        let is_final = self.tree.final_leaf().map(|leaf| leaf.id()) == Some(id);
        let segment = self.segment_elapsed;
        let elapsed = self.elapsed;

        let Some(leaf) = self.tree.leaf_mut(id) else {
            // The active id always names a leaf; recover by going idle.
            self.go_idle();
            return SplitOutcome::default();
        };
        leaf.times.current = elapsed;
        let gold = is_gold(segment, leaf.times.best_segment);
        if gold {
            leaf.times.best_segment = segment;
            leaf.times.golded_this_run = true;
        }
        let personal_best = leaf.times.personal_best;

        let finished = if is_final {
            let finish = RunFinish {
                final_time: elapsed,
                personal_best: elapsed < personal_best,
                started_at: self.run_started,
            };
            self.active = None;
            self.tree.update_expanded(None);
            debug!(final_time = %elapsed, personal_best = finish.personal_best, "run finished");
            Some(finish)
        } else {
            self.active = Some(id + 1);
            self.segment_elapsed = Time::ZERO;
            self.tree.update_expanded(self.active);
            None
        };

        SplitOutcome { gold, finished }
    }

    /// Return to idle and clear the current run.
    ///
    /// If the timer was already idle and the last run beat the personal best,
    /// that run is committed as the new personal best first. Returns whether
    /// that commit happened.
    pub fn reset(&mut self) -> bool {
        let commit = !self.is_running()
            && self
                .tree
                .final_leaf()
                .is_some_and(|leaf| leaf.times.current < leaf.times.personal_best);
        if commit {
            self.tree.commit_personal_best();
            debug!("personal best committed");
        }
        self.tree.clear_current();
        self.go_idle();
        commit
    }

    fn go_idle(&mut self) {
        self.active = None;
        self.run_started = None;
        self.tree.update_expanded(None);
    }
}

fn is_gold(segment: Time, best: Time) -> bool {
    if segment.is_unset() {
        return false;
    }
    best.is_unset() || segment.checked_add(Time::from_micros(GOLD_EPSILON)) < best
}
