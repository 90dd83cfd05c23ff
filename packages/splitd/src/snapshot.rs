//! Read-only views of a session for presentation.
//!
//! The server publishes the foreground session's snapshot on a
//! `tokio::sync::watch` channel; renderers subscribe and never touch live
//! session state.

use serde::Serialize;
use split_tree::{Delta, RowStatus, SplitNode, Time, TimesRecord, compare};

use crate::categories::Category;
use crate::session::{Identity, Session, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub game: Option<Identity>,
    pub category: Option<Identity>,
    pub categories: Vec<Category>,
    pub active: Option<usize>,
    pub elapsed: Time,
    pub segment_elapsed: Time,
    pub sum_of_best: Time,
    pub best_possible_time: Time,
    pub rows: Vec<Row>,
}

/// One displayed row: a leaf or a group, flattened depth-first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub name: String,
    pub depth: usize,
    /// Leaf id, or `None` for a group.
    pub leaf: Option<usize>,
    /// Groups only: a descendant is active.
    pub expanded: bool,
    pub times: TimesRecord,
    pub delta: Option<Delta>,
    pub status: RowStatus,
}

impl SessionSnapshot {
    pub fn capture(session: &Session) -> Self {
        let timer = session.timer();
        let mut rows = Vec::with_capacity(timer.tree().len());
        flatten(timer.tree().nodes(), 0, &mut rows);
        Self {
            session: session.id(),
            game: session.game().cloned(),
            category: session.category().cloned(),
            categories: session.categories().available().cloned().collect(),
            active: timer.active(),
            elapsed: timer.elapsed(),
            segment_elapsed: timer.segment_elapsed(),
            sum_of_best: timer.sum_of_best(),
            best_possible_time: timer.best_possible_time(),
            rows,
        }
    }

    /// Rows a renderer should draw: children of collapsed groups are hidden.
    pub fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let mut hidden_below: Option<usize> = None;
        self.rows.iter().filter(move |row| {
            if let Some(depth) = hidden_below {
                if row.depth > depth {
                    return false;
                }
                hidden_below = None;
            }
            if row.leaf.is_none() && !row.expanded {
                hidden_below = Some(row.depth);
            }
            true
        })
    }
}

fn flatten(nodes: &[SplitNode], depth: usize, rows: &mut Vec<Row>) {
    for node in nodes {
        let (delta, status) = compare(node);
        let (leaf, expanded) = match node {
            SplitNode::Leaf(leaf) => (Some(leaf.id()), false),
            SplitNode::Group(group) => (None, group.expanded()),
        };
        rows.push(Row {
            name: node.name().to_string(),
            depth,
            leaf,
            expanded,
            times: *node.times(),
            delta,
            status,
        });
        if let SplitNode::Group(group) = node {
            flatten(group.children(), depth + 1, rows);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use split_tree::{MemoryStore, RunKey, format};
    use std::sync::Arc;

    fn session_with_tree(text: &str) -> Session {
        let store = Arc::new(MemoryStore::new());
        let key = RunKey::new("g", "c").unwrap();
        store.insert_splits(key, format::parse(text).unwrap());

        let mut session = Session::new(SessionId(7), store);
        session.handle_line("GAME g Game");
        session.handle_line("CAT c Category");
        session
    }

    #[test]
    fn rows_flatten_depth_first() {
        let session = session_with_tree("\"a\" 10 -\n\"g\"\n\t\"b\" 20 -\n\t\"c\" 30 -\n");
        let snapshot = SessionSnapshot::capture(&session);
        let names: Vec<_> = snapshot
            .rows
            .iter()
            .map(|r| (r.name.as_str(), r.depth, r.leaf))
            .collect();
        assert_eq!(
            names,
            vec![("a", 0, Some(0)), ("g", 0, None), ("b", 1, Some(1)), ("c", 1, Some(2))]
        );
        assert_eq!(snapshot.sum_of_best, Time::from_micros(60));
        assert_eq!(snapshot.session, SessionId(7));
        assert_eq!(snapshot.game.as_ref().unwrap().name, "Game");
    }

    #[test]
    fn collapsed_groups_hide_children() {
        let mut session = session_with_tree("\"a\"\n\"g\"\n\t\"b\"\n\"d\"\n");
        let snapshot = SessionSnapshot::capture(&session);
        let visible: Vec<_> = snapshot.visible_rows().map(|r| r.name.as_str()).collect();
        assert_eq!(visible, vec!["a", "g", "d"]);

        session.handle_line("START 0");
        session.handle_line("SPLIT 5");
        let snapshot = SessionSnapshot::capture(&session);
        let visible: Vec<_> = snapshot.visible_rows().map(|r| r.name.as_str()).collect();
        assert_eq!(visible, vec!["a", "g", "b", "d"]);
        assert_eq!(snapshot.rows[0].status, RowStatus::Gold);
        assert_eq!(snapshot.rows[2].status, RowStatus::Pending);
    }

    #[test]
    fn serializes_as_camel_case_json() {
        let session = session_with_tree("\"a\" 10 20\n");
        let json = serde_json::to_value(SessionSnapshot::capture(&session)).unwrap();
        assert_eq!(json["session"], 7);
        assert_eq!(json["sumOfBest"], 10);
        assert_eq!(json["rows"][0]["times"]["personalBest"], 20);
        assert_eq!(json["rows"][0]["status"], "pending");
        assert!(json["active"].is_null());
    }
}
