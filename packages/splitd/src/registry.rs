use std::collections::BTreeMap;
use std::sync::Arc;

use split_tree::SplitStore;
use tracing::info;

use crate::session::{Session, SessionId};

/// Every connected session plus the one selected for display.
///
/// Owned by the server loop; nothing here is shared across tasks.
pub struct Registry {
    sessions: BTreeMap<SessionId, Session>,
    foreground: Option<SessionId>,
    next_id: u64,
    store: Arc<dyn SplitStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn SplitStore>) -> Self {
        Self {
            sessions: BTreeMap::new(),
            foreground: None,
            next_id: 1,
            store,
        }
    }

    /// Create a session for a new connection. It becomes the foreground
    /// session if there is none.
    pub fn accept(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        self.sessions.insert(id, Session::new(id, self.store.clone()));
        if self.foreground.is_none() {
            self.foreground = Some(id);
        }
        info!(session = %id, sessions = self.sessions.len(), foreground = self.foreground == Some(id), "session accepted");
        id
    }

    /// Drop a session. Losing the foreground session leaves no foreground;
    /// another session is not promoted.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        if self.foreground == Some(id) {
            self.foreground = None;
        }
        session.close();
        info!(session = %id, sessions = self.sessions.len(), "session removed");
        Some(session)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn foreground(&self) -> Option<SessionId> {
        self.foreground
    }

    pub fn foreground_session(&self) -> Option<&Session> {
        self.foreground.and_then(|id| self.sessions.get(&id))
    }

    /// Select `id` for display. Returns `false` if no such session exists.
    pub fn set_foreground(&mut self, id: SessionId) -> bool {
        if !self.sessions.contains_key(&id) {
            return false;
        }
        self.foreground = Some(id);
        true
    }

    /// Sessions in the order they connected.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use split_tree::{MemoryStore, RunKey};

    fn registry() -> (Arc<MemoryStore>, Registry) {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::new(store.clone());
        (store, registry)
    }

    #[test]
    fn first_session_becomes_foreground() {
        let (_store, mut registry) = registry();
        let a = registry.accept();
        let b = registry.accept();
        assert_ne!(a, b);
        assert_eq!(registry.foreground(), Some(a));
        assert_eq!(registry.foreground_session().unwrap().id(), a);
        let order: Vec<_> = registry.iter().map(Session::id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn removing_foreground_does_not_promote() {
        let (_store, mut registry) = registry();
        let a = registry.accept();
        let b = registry.accept();
        assert!(registry.remove(a).is_some());
        assert_eq!(registry.foreground(), None);
        assert_eq!(registry.len(), 1);

        // The next connection takes the empty slot.
        let c = registry.accept();
        assert_eq!(registry.foreground(), Some(c));
        assert!(registry.get(b).is_some());
    }

    #[test]
    fn removing_background_keeps_foreground() {
        let (_store, mut registry) = registry();
        let a = registry.accept();
        let b = registry.accept();
        registry.remove(b);
        assert_eq!(registry.foreground(), Some(a));
        assert!(registry.remove(b).is_none());
    }

    #[test]
    fn set_foreground_requires_existing_session() {
        let (_store, mut registry) = registry();
        let a = registry.accept();
        let b = registry.accept();
        assert!(registry.set_foreground(b));
        assert_eq!(registry.foreground(), Some(b));
        assert!(!registry.set_foreground(SessionId(99)));
        registry.remove(a);
        assert_eq!(registry.foreground(), Some(b));
    }

    #[test]
    fn removal_notifies_recovery() {
        let (store, mut registry) = registry();
        let id = registry.accept();
        let session = registry.get_mut(id).unwrap();
        for line in ["GAME g G", "CAT c C", "RECOVERDATA state"] {
            session.handle_line(line);
        }
        registry.remove(id);
        let key = RunKey::new("g", "c").unwrap();
        assert_eq!(store.entry(&key).unwrap().recovery.as_deref(), Some("state"));
        assert!(registry.is_empty());
    }
}
