//! # split_tree
//!
//! Data model and run logic for a segmented-run timer.
//!
//! A run is divided into splits (leaves) that can be nested in named groups.
//! Every leaf carries a [`TimesRecord`]: the cumulative time reached in the
//! current run, the cumulative time in the personal-best run, and the best
//! segment ever recorded for that split.
//!
//! - [`tree`] holds the [`SplitTree`] itself.
//! - [`calc`] derives sum of best, best possible time and per-row comparisons.
//! - [`timer`] is the idle/running state machine driven by start, split,
//!   update and reset.
//! - [`format`] reads and writes the split-definition text format.
//! - [`store`] persists trees, golds and completed runs.
//!
//! ## Quick Start
//!
//! ```rust
//! use split_tree::{SplitTree, Time, Timer};
//!
//! let mut timer = Timer::new(SplitTree::flat(2));
//! timer.start();
//! timer.update(Time::from_micros(900_000));
//! let outcome = timer.split();
//! assert!(outcome.gold);
//! assert_eq!(timer.active(), Some(1));
//! ```
//!
//! All times are microseconds. An absent time is [`Time::UNSET`], which sorts
//! after every real time.

pub mod calc;
pub mod error;
pub mod format;
pub mod store;
pub mod time;
pub mod timer;
pub mod tree;

pub use calc::{RowStatus, best_possible_time, compare, sum_of_best};
pub use error::{FormatError, StoreError, TreeError};
pub use store::{FileStore, MemoryStore, RunKey, SplitStore};
pub use time::{Delta, Time};
pub use timer::{GOLD_EPSILON, RunFinish, SplitOutcome, Timer};
pub use tree::{Group, Leaf, SplitNode, SplitTree, TimesRecord};
