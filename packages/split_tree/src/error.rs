use std::path::PathBuf;

/// Errors from structural operations on a [`SplitTree`](crate::SplitTree).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("no split with id {0}")]
    UnknownLeaf(usize),

    #[error("group {0:?} has no children")]
    EmptyGroup(String),
}

/// Errors from parsing the split-definition text format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("line {line}: expected a double-quoted split name")]
    MissingName { line: usize },

    #[error("line {line}: unterminated split name")]
    UnterminatedName { line: usize },

    #[error("line {line}: invalid time field {value:?}")]
    BadTime { line: usize, value: String },

    #[error("line {line}: too many fields after the split name")]
    TooManyFields { line: usize },

    #[error("line {line}: unexpected indentation (depth {found}, expected at most {expected})")]
    Indentation {
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Errors from the storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} not found")]
    NotFound(PathBuf),

    #[error("invalid storage key component {0:?}")]
    InvalidKey(String),

    #[error("{path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("{path}: line {line}: invalid time value")]
    BadTimes { path: PathBuf, line: usize },

    #[error("{path}: expected {expected} times, found {found}")]
    LeafCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
