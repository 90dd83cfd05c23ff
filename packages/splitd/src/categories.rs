//! The set of run categories a producer offers, edited in two phases.
//!
//! `ADDCAT`/`DELCAT`/`CLEARCATS` stage changes by flipping each entry's
//! `uncommitted` flag; `COMMITCATS` makes the staged set the available one.
//! Until then presentation keeps seeing the previously committed entries.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: String,
    /// Display name, if the producer supplied one.
    pub name: Option<String>,
    /// Part of the last committed set.
    pub committed: bool,
    /// Part of the set being staged.
    pub uncommitted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySet {
    entries: Vec<Category>,
}

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propose a category. Proposing an id that is already present updates
    /// its display name instead of adding a duplicate.
    pub fn add(&mut self, id: &str, name: Option<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|c| c.id == id) {
            entry.name = name;
            entry.uncommitted = true;
            return;
        }
        self.entries.push(Category {
            id: id.to_string(),
            name,
            committed: false,
            uncommitted: true,
        });
    }

    /// Withdraw a proposal. Entries that were never committed disappear.
    pub fn delete(&mut self, id: &str) {
        self.entries.retain_mut(|c| {
            if c.id != id {
                return true;
            }
            c.uncommitted = false;
            c.committed
        });
    }

    /// Withdraw every proposal.
    pub fn clear(&mut self) {
        self.entries.retain_mut(|c| {
            c.uncommitted = false;
            c.committed
        });
    }

    /// Make the staged set the committed one.
    pub fn commit(&mut self) {
        self.entries.retain(|c| c.uncommitted);
        for c in &mut self.entries {
            c.committed = true;
        }
    }

    /// Committed categories, in the order they were first proposed.
    pub fn available(&self) -> impl Iterator<Item = &Category> {
        self.entries.iter().filter(|c| c.committed)
    }

    pub fn entries(&self) -> &[Category] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(it: impl Iterator<Item = &'a Category>) -> Vec<&'a str> {
        it.map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn commit_publishes_proposals() {
        let mut cats = CategorySet::new();
        cats.add("any", Some("Any%".to_string()));
        cats.add("100", None);
        assert!(ids(cats.available()).is_empty());

        cats.commit();
        assert_eq!(ids(cats.available()), vec!["any", "100"]);
        assert_eq!(cats.entries()[0].name.as_deref(), Some("Any%"));
    }

    #[test]
    fn staged_removal_keeps_committed_until_commit() {
        let mut cats = CategorySet::new();
        cats.add("any", None);
        cats.add("100", None);
        cats.commit();

        cats.delete("100");
        assert_eq!(ids(cats.available()), vec!["any", "100"]);
        cats.commit();
        assert_eq!(ids(cats.available()), vec!["any"]);
    }

    #[test]
    fn delete_drops_uncommitted_proposal() {
        let mut cats = CategorySet::new();
        cats.add("any", None);
        cats.delete("any");
        assert!(cats.is_empty());
    }

    #[test]
    fn clear_then_repropose() {
        let mut cats = CategorySet::new();
        cats.add("any", None);
        cats.add("16", None);
        cats.commit();
        cats.add("70", None);

        cats.clear();
        assert_eq!(ids(cats.entries().iter()), vec!["any", "16"]);
        assert!(cats.entries().iter().all(|c| !c.uncommitted));

        cats.add("16", Some("16 Star".to_string()));
        cats.commit();
        assert_eq!(ids(cats.available()), vec!["16"]);
        assert_eq!(cats.entries()[0].name.as_deref(), Some("16 Star"));
    }

    #[test]
    fn re_adding_does_not_duplicate() {
        let mut cats = CategorySet::new();
        cats.add("any", None);
        cats.add("any", Some("Any%".to_string()));
        assert_eq!(cats.entries().len(), 1);
        assert_eq!(cats.entries()[0].name.as_deref(), Some("Any%"));
    }
}
