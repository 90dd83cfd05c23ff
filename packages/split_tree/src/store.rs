//! Persistence of split definitions, best segments and completed runs.
//!
//! Everything for one game/category pair lives in its own directory:
//!
//! ```text
//! <data_dir>/<game>/<category>/
//! ├── splits          split definitions (see [`crate::format`])
//! ├── golds           best segment per leaf
//! ├── pb -> runs/...  the personal-best run
//! ├── runs/
//! │   └── 2026-01-31_20-15-02
//! └── recovery
//! ```
//!
//! `golds` and run files hold one time per line in depth-first leaf order.
//! When present and well formed they override the times written inline in
//! `splits`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::format;
use crate::time::Time;
use crate::tree::SplitTree;

const SPLITS_FILE: &str = "splits";
const GOLDS_FILE: &str = "golds";
const PB_LINK: &str = "pb";
const RUNS_DIR: &str = "runs";
const RECOVERY_FILE: &str = "recovery";
const RUN_FILE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Identity of a set of splits: a game id and a category id.
///
/// Both components become directory names, so they are validated on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    game: String,
    category: String,
}

impl RunKey {
    pub fn new(game: impl Into<String>, category: impl Into<String>) -> Result<Self> {
        let game = game.into();
        let category = category.into();
        validate_component(&game)?;
        validate_component(&category)?;
        Ok(Self { game, category })
    }

    pub fn game(&self) -> &str {
        &self.game
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    fn dir(&self, root: &Path) -> PathBuf {
        root.join(&self.game).join(&self.category)
    }
}

impl std::fmt::Display for RunKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.game, self.category)
    }
}

fn validate_component(s: &str) -> Result<()> {
    if s.is_empty() || s == "." || s == ".." || s.contains('/') || s.contains('\0') {
        return Err(StoreError::InvalidKey(s.to_string()));
    }
    Ok(())
}

/// Storage collaborator used by sessions.
pub trait SplitStore: Send + Sync {
    /// Load the split tree for `key`, with best segments and personal bests
    /// applied.
    fn load(&self, key: &RunKey) -> Result<SplitTree>;

    /// Write the split definitions, including inline times.
    fn save_splits(&self, key: &RunKey, tree: &SplitTree) -> Result<()>;

    /// Write every leaf's best segment.
    fn save_golds(&self, key: &RunKey, tree: &SplitTree) -> Result<()>;

    /// Record a completed run's cumulative times. When `personal_best` is
    /// set the run also becomes the new personal-best reference.
    fn save_run(
        &self,
        key: &RunKey,
        tree: &SplitTree,
        started_at: DateTime<Local>,
        personal_best: bool,
    ) -> Result<()>;

    fn save_recovery(&self, key: &RunKey, payload: &str) -> Result<()>;
}

/// Render times one per line.
pub fn write_times(times: impl IntoIterator<Item = Time>) -> String {
    let mut out = String::new();
    for time in times {
        out.push_str(&time.to_string());
        out.push('\n');
    }
    out
}

/// Parse a times file. On failure returns the 1-based line that did not parse.
pub fn parse_times(input: &str) -> std::result::Result<Vec<Time>, usize> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| line.trim().parse().map_err(|_| idx + 1))
        .collect()
}

fn current_times(tree: &SplitTree) -> impl Iterator<Item = Time> + '_ {
    tree.leaves().map(|leaf| leaf.times.current)
}

fn best_segments(tree: &SplitTree) -> impl Iterator<Item = Time> + '_ {
    tree.leaves().map(|leaf| leaf.times.best_segment)
}

fn apply_golds(tree: &mut SplitTree, golds: &[Time]) {
    let mut golds = golds.iter();
    tree.for_each_leaf_mut(|leaf| {
        if let Some(best) = golds.next() {
            leaf.times.best_segment = *best;
        }
    });
}

fn apply_personal_best(tree: &mut SplitTree, pb: &[Time]) {
    let mut pb = pb.iter();
    tree.for_each_leaf_mut(|leaf| {
        if let Some(time) = pb.next() {
            leaf.times.personal_best = *time;
        }
    });
}

// ── Filesystem store ────────────────────────────────────────────────

/// [`SplitStore`] backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, key: &RunKey) -> PathBuf {
        key.dir(&self.root)
    }

    /// Read a times file for `tree`. Missing or malformed files yield `None`;
    /// malformed ones are logged.
    fn read_times(&self, path: &Path, expected: usize) -> Option<Vec<Time>> {
        match read_times_file(path, expected) {
            Ok(times) => Some(times),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(error = %e, "ignoring times file");
                None
            }
        }
    }
}

fn read_times_file(path: &Path, expected: usize) -> Result<Vec<Time>> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let times = parse_times(&text).map_err(|line| StoreError::BadTimes {
        path: path.to_path_buf(),
        line,
    })?;
    if times.len() != expected {
        return Err(StoreError::LeafCountMismatch {
            path: path.to_path_buf(),
            expected,
            found: times.len(),
        });
    }
    Ok(times)
}

/// Write through a temporary sibling so readers never see a partial file.
fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

#[cfg(unix)]
fn link_personal_best(dir: &Path, run_name: &str) -> Result<()> {
    let link = dir.join(PB_LINK);
    match fs::remove_file(&link) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::io(&link, e)),
    }
    let target = Path::new(RUNS_DIR).join(run_name);
    std::os::unix::fs::symlink(&target, &link).map_err(|e| StoreError::io(&link, e))
}

#[cfg(not(unix))]
fn link_personal_best(dir: &Path, run_name: &str) -> Result<()> {
    let link = dir.join(PB_LINK);
    let source = dir.join(RUNS_DIR).join(run_name);
    fs::copy(&source, &link)
        .map(|_| ())
        .map_err(|e| StoreError::io(&link, e))
}

impl SplitStore for FileStore {
    fn load(&self, key: &RunKey) -> Result<SplitTree> {
        let dir = self.dir(key);
        let splits_path = dir.join(SPLITS_FILE);
        let text = fs::read_to_string(&splits_path).map_err(|e| StoreError::io(&splits_path, e))?;
        let mut tree = format::parse(&text).map_err(|source| StoreError::Format {
            path: splits_path.clone(),
            source,
        })?;

        if let Some(golds) = self.read_times(&dir.join(GOLDS_FILE), tree.len()) {
            apply_golds(&mut tree, &golds);
        }
        if let Some(pb) = self.read_times(&dir.join(PB_LINK), tree.len()) {
            apply_personal_best(&mut tree, &pb);
        }

        debug!(key = %key, leaves = tree.len(), "loaded splits");
        Ok(tree)
    }

    fn save_splits(&self, key: &RunKey, tree: &SplitTree) -> Result<()> {
        write_file(&self.dir(key).join(SPLITS_FILE), &format::write(tree))
    }

    fn save_golds(&self, key: &RunKey, tree: &SplitTree) -> Result<()> {
        write_file(&self.dir(key).join(GOLDS_FILE), &write_times(best_segments(tree)))
    }

    fn save_run(
        &self,
        key: &RunKey,
        tree: &SplitTree,
        started_at: DateTime<Local>,
        personal_best: bool,
    ) -> Result<()> {
        let dir = self.dir(key);
        let run_name = started_at.format(RUN_FILE_FORMAT).to_string();
        let run_path = dir.join(RUNS_DIR).join(&run_name);
        write_file(&run_path, &write_times(current_times(tree)))?;
        debug!(path = %run_path.display(), personal_best, "saved run");

        if personal_best {
            link_personal_best(&dir, &run_name)?;
        }
        Ok(())
    }

    fn save_recovery(&self, key: &RunKey, payload: &str) -> Result<()> {
        write_file(&self.dir(key).join(RECOVERY_FILE), payload)
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// What a [`MemoryStore`] holds for one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryEntry {
    pub splits: Option<SplitTree>,
    pub golds: Option<Vec<Time>>,
    pub personal_best: Option<Vec<Time>>,
    /// Completed runs, oldest first, with their personal-best flag.
    pub runs: Vec<(Vec<Time>, bool)>,
    pub recovery: Option<String>,
}

/// [`SplitStore`] kept entirely in memory. Useful for tests and for running
/// without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<RunKey, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed split definitions for a key.
    pub fn insert_splits(&self, key: RunKey, tree: SplitTree) {
        self.with_entry(&key, |entry| entry.splits = Some(tree));
    }

    /// Snapshot of what is stored for `key`.
    pub fn entry(&self, key: &RunKey) -> Option<MemoryEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn with_entry<T>(&self, key: &RunKey, f: impl FnOnce(&mut MemoryEntry) -> T) -> T {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(entries.entry(key.clone()).or_default())
    }
}

impl SplitStore for MemoryStore {
    fn load(&self, key: &RunKey) -> Result<SplitTree> {
        let entry = self
            .entry(key)
            .ok_or_else(|| StoreError::NotFound(PathBuf::from(key.to_string())))?;
        let mut tree = entry
            .splits
            .ok_or_else(|| StoreError::NotFound(PathBuf::from(key.to_string())))?;
        if let Some(golds) = entry.golds.filter(|g| g.len() == tree.len()) {
            apply_golds(&mut tree, &golds);
        }
        if let Some(pb) = entry.personal_best.filter(|p| p.len() == tree.len()) {
            apply_personal_best(&mut tree, &pb);
        }
        Ok(tree)
    }

    fn save_splits(&self, key: &RunKey, tree: &SplitTree) -> Result<()> {
        self.with_entry(key, |entry| entry.splits = Some(tree.clone()));
        Ok(())
    }

    fn save_golds(&self, key: &RunKey, tree: &SplitTree) -> Result<()> {
        let golds = best_segments(tree).collect();
        self.with_entry(key, |entry| entry.golds = Some(golds));
        Ok(())
    }

    fn save_run(
        &self,
        key: &RunKey,
        tree: &SplitTree,
        _started_at: DateTime<Local>,
        personal_best: bool,
    ) -> Result<()> {
        let times: Vec<Time> = current_times(tree).collect();
        self.with_entry(key, |entry| {
            if personal_best {
                entry.personal_best = Some(times.clone());
            }
            entry.runs.push((times, personal_best));
        });
        Ok(())
    }

    fn save_recovery(&self, key: &RunKey, payload: &str) -> Result<()> {
        self.with_entry(key, |entry| entry.recovery = Some(payload.to_string()));
        Ok(())
    }
}
