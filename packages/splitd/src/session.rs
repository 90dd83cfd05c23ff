//! One producer connection's state: its split tree, timer, identity and
//! category set.

use std::fmt;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use split_tree::{RunKey, SplitOutcome, SplitStore, SplitTree, Timer};
use tracing::{debug, info, warn};

use crate::categories::CategorySet;
use crate::command::{Command, PROTOCOL_VERSION};

/// Unique identifier for a session.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A game or category as named by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

pub struct Session {
    id: SessionId,
    timer: Timer,
    game: Option<Identity>,
    category: Option<Identity>,
    categories: CategorySet,
    recovery: String,
    graceful: bool,
    store: Arc<dyn SplitStore>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("game", &self.game)
            .field("category", &self.category)
            .field("active", &self.timer.active())
            .field("leaves", &self.timer.tree().len())
            .field("graceful", &self.graceful)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(id: SessionId, store: Arc<dyn SplitStore>) -> Self {
        Self {
            id,
            timer: Timer::default(),
            game: None,
            category: None,
            categories: CategorySet::new(),
            recovery: String::new(),
            graceful: false,
            store,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn game(&self) -> Option<&Identity> {
        self.game.as_ref()
    }

    pub fn category(&self) -> Option<&Identity> {
        self.category.as_ref()
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn recovery(&self) -> &str {
        &self.recovery
    }

    /// True if the last line received was `GOODBYE`.
    pub fn is_graceful(&self) -> bool {
        self.graceful
    }

    /// Handle one line from the producer and return the lines to send back.
    ///
    /// Lines that do not decode are logged and dropped.
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        self.graceful = false;
        match Command::decode(line) {
            Ok(command) => self.apply(command),
            Err(error) => {
                debug!(session = %self.id, %error, "ignoring line");
                Vec::new()
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Vec<String> {
        let verb = command.verb();
        match command {
            Command::Hello { versions } => {
                if versions.iter().any(|v| v == PROTOCOL_VERSION) {
                    return vec![format!("HELLO {PROTOCOL_VERSION}"), "NORECOVER".to_string()];
                }
                debug!(session = %self.id, ?versions, "no supported protocol version offered");
            }
            Command::Game { id, name } => {
                self.game = Some(Identity { id, name });
                self.load_splits();
            }
            Command::Category { id, name } => {
                self.category = Some(Identity { id, name });
                self.load_splits();
            }
            Command::AddCategory { id, name } => self.categories.add(&id, name),
            Command::DeleteCategory { id } => self.categories.delete(&id),
            Command::ClearCategories => self.categories.clear(),
            Command::CommitCategories => self.categories.commit(),
            Command::Sync(elapsed) => self.timer.update(elapsed),
            Command::Start(elapsed) => {
                self.timer.update(elapsed);
                self.timer.start();
            }
            Command::Split(elapsed) => {
                self.timer.update(elapsed);
                let outcome = self.timer.split();
                self.persist_split(outcome);
            }
            Command::Reset(elapsed) => {
                if self.timer.reset() {
                    info!(session = %self.id, "personal best committed on reset");
                }
                self.timer.update(elapsed);
            }
            Command::SplitCount(n) => {
                if self.timer.resize(n) {
                    debug!(session = %self.id, leaves = n, "rebuilt split tree");
                    self.save_splits();
                }
            }
            Command::SplitName { id, name } => match self.timer.rename(id, name) {
                Ok(()) => self.save_splits(),
                Err(error) => debug!(session = %self.id, %error, "ignoring {verb}"),
            },
            Command::RecoverData(data) => self.recovery = data,
            Command::RecoverAppend(data) => self.recovery.push_str(&data),
            Command::Goodbye => self.graceful = true,
        }
        Vec::new()
    }

    /// Called once when the connection goes away. Hands the recovery payload
    /// to storage unless the producer said goodbye.
    pub fn close(&self) {
        if self.graceful {
            debug!(session = %self.id, "closed gracefully");
            return;
        }
        info!(session = %self.id, "closed without goodbye");
        if self.recovery.is_empty() {
            return;
        }
        let Some(key) = self.run_key() else {
            return;
        };
        if let Err(error) = self.store.save_recovery(&key, &self.recovery) {
            warn!(session = %self.id, %error, "failed to save recovery data");
        }
    }

    fn run_key(&self) -> Option<RunKey> {
        let game = self.game.as_ref()?;
        let category = self.category.as_ref()?;
        match RunKey::new(game.id.as_str(), category.id.as_str()) {
            Ok(key) => Some(key),
            Err(error) => {
                warn!(session = %self.id, %error, "unusable game/category identity");
                None
            }
        }
    }

    /// Replace the tree with whatever storage has for the current identity,
    /// or an empty tree if there is nothing usable.
    fn load_splits(&mut self) {
        self.timer.replace_tree(SplitTree::default());
        let Some(key) = self.run_key() else {
            return;
        };
        match self.store.load(&key) {
            Ok(tree) => {
                info!(session = %self.id, %key, leaves = tree.len(), "loaded splits");
                self.timer.replace_tree(tree);
            }
            Err(error) if error.is_not_found() => {
                debug!(session = %self.id, %key, "no stored splits");
            }
            Err(error) => {
                warn!(session = %self.id, %key, %error, "failed to load splits");
            }
        }
    }

    fn save_splits(&self) {
        let Some(key) = self.run_key() else {
            return;
        };
        if let Err(error) = self.store.save_splits(&key, self.timer.tree()) {
            warn!(session = %self.id, %key, %error, "failed to save splits");
        }
    }

    fn persist_split(&self, outcome: SplitOutcome) {
        if !outcome.gold && outcome.finished.is_none() {
            return;
        }
        let Some(key) = self.run_key() else {
            return;
        };
        let tree = self.timer.tree();
        if outcome.gold {
            if let Err(error) = self.store.save_golds(&key, tree) {
                warn!(session = %self.id, %key, %error, "failed to save golds");
            }
        }
        if let Some(finish) = outcome.finished {
            info!(
                session = %self.id,
                %key,
                final_time = %finish.final_time.format(true),
                personal_best = finish.personal_best,
                "run finished"
            );
            let started_at = finish.started_at.unwrap_or_else(Local::now);
            if let Err(error) = self.store.save_run(&key, tree, started_at, finish.personal_best) {
                warn!(session = %self.id, %key, %error, "failed to save run");
            }
        }
    }
}
