//! The split tree: an ordered forest of leaves (timed segments) and named
//! groups.
//!
//! Leaf ids are assigned depth-first, left to right, when a [`SplitTree`] is
//! built, so they always run densely from `0` to `len() - 1`. A group always
//! has at least one child; [`SplitNode::group`] refuses to build one without.

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::time::Time;

/// Timing record carried by every leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesRecord {
    /// Cumulative time at which this leaf was completed in the current run.
    pub current: Time,
    /// Cumulative time of this leaf in the personal-best run.
    pub personal_best: Time,
    /// Fastest segment time ever recorded for this leaf.
    pub best_segment: Time,
    pub golded_this_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    id: usize,
    pub name: String,
    pub times: TimesRecord,
}

impl Leaf {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    children: Vec<SplitNode>,
    expanded: bool,
}

impl Group {
    pub fn children(&self) -> &[SplitNode] {
        &self.children
    }

    /// True while any descendant leaf is the active one.
    pub fn expanded(&self) -> bool {
        self.expanded
    }

    fn final_leaf(&self) -> &Leaf {
        // Non-empty by construction.
        self.children[self.children.len() - 1].final_leaf()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitNode {
    Leaf(Leaf),
    Group(Group),
}

impl SplitNode {
    /// A leaf with no recorded times. Its id is assigned when the tree is built.
    pub fn leaf(name: impl Into<String>) -> Self {
        Self::leaf_with_times(name, TimesRecord::default())
    }

    pub fn leaf_with_times(name: impl Into<String>, times: TimesRecord) -> Self {
        SplitNode::Leaf(Leaf {
            id: 0,
            name: name.into(),
            times,
        })
    }

    pub fn group(name: impl Into<String>, children: Vec<SplitNode>) -> Result<Self, TreeError> {
        let name = name.into();
        if children.is_empty() {
            return Err(TreeError::EmptyGroup(name));
        }
        Ok(SplitNode::Group(Group {
            name,
            children,
            expanded: false,
        }))
    }

    pub fn name(&self) -> &str {
        match self {
            SplitNode::Leaf(leaf) => &leaf.name,
            SplitNode::Group(group) => &group.name,
        }
    }

    /// The times of this node's right-most descendant leaf. A group reports
    /// the progress of its last split.
    pub fn times(&self) -> &TimesRecord {
        &self.final_leaf().times
    }

    pub fn final_leaf(&self) -> &Leaf {
        match self {
            SplitNode::Leaf(leaf) => leaf,
            SplitNode::Group(group) => group.final_leaf(),
        }
    }

    pub fn as_leaf(&self) -> Option<&Leaf> {
        match self {
            SplitNode::Leaf(leaf) => Some(leaf),
            SplitNode::Group(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitTree {
    nodes: Vec<SplitNode>,
    leaf_count: usize,
}

impl SplitTree {
    /// Build a tree, assigning leaf ids depth-first.
    pub fn new(mut nodes: Vec<SplitNode>) -> Self {
        let mut next = 0;
        number_leaves(&mut nodes, &mut next);
        Self {
            nodes,
            leaf_count: next,
        }
    }

    /// `n` flat leaves named `0`..`n-1`.
    pub fn flat(n: usize) -> Self {
        Self::new((0..n).map(|i| SplitNode::leaf(i.to_string())).collect())
    }

    pub fn nodes(&self) -> &[SplitNode] {
        &self.nodes
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    pub fn leaf(&self, id: usize) -> Option<&Leaf> {
        find_leaf(&self.nodes, id)
    }

    pub fn leaf_mut(&mut self, id: usize) -> Option<&mut Leaf> {
        find_leaf_mut(&mut self.nodes, id)
    }

    /// The last leaf in depth-first order: the split that ends a run.
    pub fn final_leaf(&self) -> Option<&Leaf> {
        self.nodes.last().map(SplitNode::final_leaf)
    }

    /// Leaves in depth-first order.
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            stack: vec![self.nodes.iter()],
        }
    }

    pub fn for_each_leaf_mut(&mut self, mut f: impl FnMut(&mut Leaf)) {
        visit_leaves_mut(&mut self.nodes, &mut f);
    }

    /// Replace the tree with `n` fresh flat leaves. Returns `false` without
    /// touching anything when the tree already has exactly `n` leaves.
    pub fn resize(&mut self, n: usize) -> bool {
        let final_id = self.final_leaf().map(Leaf::id);
        let unchanged = match final_id {
            Some(id) => id + 1 == n,
            None => n == 0,
        };
        if unchanged {
            return false;
        }
        *self = Self::flat(n);
        true
    }

    pub fn rename(&mut self, id: usize, name: impl Into<String>) -> Result<(), TreeError> {
        let leaf = self.leaf_mut(id).ok_or(TreeError::UnknownLeaf(id))?;
        leaf.name = name.into();
        Ok(())
    }

    /// Cumulative time recorded for the leaf before `id`, or zero for the
    /// first leaf.
    pub fn previous_current(&self, id: usize) -> Time {
        match id.checked_sub(1) {
            None => Time::ZERO,
            Some(prev) => self
                .leaf(prev)
                .map(|leaf| leaf.times.current)
                .unwrap_or(Time::UNSET),
        }
    }

    /// Recompute every group's `expanded` flag for the given active leaf.
    pub fn update_expanded(&mut self, active: Option<usize>) {
        update_expanded(&mut self.nodes, active);
    }

    /// Clear current-run fields on every leaf.
    pub fn clear_current(&mut self) {
        self.for_each_leaf_mut(|leaf| {
            leaf.times.current = Time::UNSET;
            leaf.times.golded_this_run = false;
        });
    }

    /// Copy each leaf's current cumulative time into its personal best.
    pub fn commit_personal_best(&mut self) {
        self.for_each_leaf_mut(|leaf| leaf.times.personal_best = leaf.times.current);
    }
}

/// Depth-first iterator over a tree's leaves.
pub struct Leaves<'a> {
    stack: Vec<std::slice::Iter<'a, SplitNode>>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Leaf;

    fn next(&mut self) -> Option<&'a Leaf> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(SplitNode::Leaf(leaf)) => return Some(leaf),
                Some(SplitNode::Group(group)) => self.stack.push(group.children.iter()),
            }
        }
    }
}

fn number_leaves(nodes: &mut [SplitNode], next: &mut usize) {
    for node in nodes {
        match node {
            SplitNode::Leaf(leaf) => {
                leaf.id = *next;
                *next += 1;
            }
            SplitNode::Group(group) => number_leaves(&mut group.children, next),
        }
    }
}

fn find_leaf(nodes: &[SplitNode], id: usize) -> Option<&Leaf> {
    for node in nodes {
        match node {
            SplitNode::Leaf(leaf) if leaf.id == id => return Some(leaf),
            SplitNode::Leaf(_) => {}
            SplitNode::Group(group) => {
                if let Some(leaf) = find_leaf(&group.children, id) {
                    return Some(leaf);
                }
            }
        }
    }
    None
}

fn find_leaf_mut(nodes: &mut [SplitNode], id: usize) -> Option<&mut Leaf> {
    for node in nodes {
        match node {
            SplitNode::Leaf(leaf) if leaf.id == id => return Some(leaf),
            SplitNode::Leaf(_) => {}
            SplitNode::Group(group) => {
                if let Some(leaf) = find_leaf_mut(&mut group.children, id) {
                    return Some(leaf);
                }
            }
        }
    }
    None
}

fn visit_leaves_mut(nodes: &mut [SplitNode], f: &mut impl FnMut(&mut Leaf)) {
    for node in nodes {
        match node {
            SplitNode::Leaf(leaf) => f(leaf),
            SplitNode::Group(group) => visit_leaves_mut(&mut group.children, f),
        }
    }
}

fn update_expanded(nodes: &mut [SplitNode], active: Option<usize>) -> bool {
    let mut expand = false;
    for node in nodes {
        match node {
            SplitNode::Leaf(leaf) => expand |= active == Some(leaf.id),
            SplitNode::Group(group) => {
                group.expanded = update_expanded(&mut group.children, active);
                expand |= group.expanded;
            }
        }
    }
    expand
}
