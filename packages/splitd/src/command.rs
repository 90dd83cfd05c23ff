//! Decoding of the producer line protocol.
//!
//! A line is a verb followed by space-separated arguments. Each verb takes a
//! fixed number of plain arguments, and some take one more "trailing"
//! argument holding the rest of the line verbatim, spaces included.
//! `HELLO` takes any number of arguments.

use split_tree::Time;

/// Version string offered by `HELLO`.
pub const PROTOCOL_VERSION: &str = "0.1";

/// Largest split count accepted from `NSPLITS`.
pub const MAX_SPLITS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Hello { versions: Vec<String> },
    Game { id: String, name: String },
    Category { id: String, name: String },
    AddCategory { id: String, name: Option<String> },
    DeleteCategory { id: String },
    ClearCategories,
    CommitCategories,
    Sync(Time),
    Start(Time),
    Split(Time),
    Reset(Time),
    SplitCount(usize),
    SplitName { id: usize, name: String },
    RecoverData(String),
    RecoverAppend(String),
    Goodbye,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty command")]
    Empty,

    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("{verb} takes {expected} argument(s), got {found}")]
    Arity {
        verb: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{verb}: invalid number {value:?}")]
    BadNumber { verb: &'static str, value: String },

    #[error("split count {0} is too large")]
    TooManySplits(usize),
}

/// How a verb's arguments are laid out.
#[derive(Debug, Clone, Copy)]
enum Shape {
    Variadic,
    Fixed(usize),
    /// `n` plain arguments, then the remainder of the line.
    Trailing(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Hello,
    Game,
    Cat,
    AddCat,
    DelCat,
    ClearCats,
    CommitCats,
    Sync,
    Start,
    Split,
    Reset,
    NSplits,
    SplitName,
    RecoverData,
    RecoverAppend,
    Goodbye,
}

const VERBS: &[(&str, Verb, Shape)] = &[
    ("HELLO", Verb::Hello, Shape::Variadic),
    ("GAME", Verb::Game, Shape::Trailing(1)),
    ("CAT", Verb::Cat, Shape::Trailing(1)),
    ("ADDCAT", Verb::AddCat, Shape::Trailing(1)),
    ("DELCAT", Verb::DelCat, Shape::Fixed(1)),
    ("CLEARCATS", Verb::ClearCats, Shape::Fixed(0)),
    ("COMMITCATS", Verb::CommitCats, Shape::Fixed(0)),
    ("SYNC", Verb::Sync, Shape::Fixed(1)),
    ("START", Verb::Start, Shape::Fixed(1)),
    ("SPLIT", Verb::Split, Shape::Fixed(1)),
    ("RESET", Verb::Reset, Shape::Fixed(1)),
    ("NSPLITS", Verb::NSplits, Shape::Fixed(1)),
    ("SPLITNAME", Verb::SplitName, Shape::Trailing(1)),
    ("RECOVERDATA", Verb::RecoverData, Shape::Trailing(0)),
    ("RECOVERAPPEND", Verb::RecoverAppend, Shape::Trailing(0)),
    ("GOODBYE", Verb::Goodbye, Shape::Fixed(0)),
];

fn lookup(verb: &str) -> Option<(&'static str, Verb, Shape)> {
    VERBS.iter().find(|(name, _, _)| *name == verb).copied()
}

/// Split the arguments according to `shape`. Returns the plain
/// arguments and, for trailing shapes, the remainder of the line.
fn split_args<'a>(
    name: &'static str,
    shape: Shape,
    rest: Option<&'a str>,
) -> Result<(Vec<&'a str>, &'a str), DecodeError> {
    match shape {
        Shape::Variadic => Ok((rest.map(|r| r.split(' ').collect()).unwrap_or_default(), "")),
        Shape::Fixed(n) => fixed(name, rest, n).map(|args| (args, "")),
        Shape::Trailing(n) => trailing(name, rest, n),
    }
}

/// Split `rest` into exactly `n` space-separated arguments.
fn fixed<'a>(verb: &'static str, rest: Option<&'a str>, n: usize) -> Result<Vec<&'a str>, DecodeError> {
    let args: Vec<&str> = match rest {
        None => Vec::new(),
        Some(rest) => rest.split(' ').collect(),
    };
    if args.len() != n {
        return Err(DecodeError::Arity {
            verb,
            expected: n,
            found: args.len(),
        });
    }
    Ok(args)
}

/// Take `n` plain arguments and return them along with the remainder.
fn trailing<'a>(
    verb: &'static str,
    rest: Option<&'a str>,
    n: usize,
) -> Result<(Vec<&'a str>, &'a str), DecodeError> {
    let mut args = Vec::with_capacity(n);
    let mut rest = rest;
    for _ in 0..n {
        let Some(text) = rest else {
            return Err(DecodeError::Arity {
                verb,
                expected: n,
                found: args.len(),
            });
        };
        match text.split_once(' ') {
            Some((arg, tail)) => {
                args.push(arg);
                rest = Some(tail);
            }
            None => {
                args.push(text);
                rest = None;
            }
        }
    }
    Ok((args, rest.unwrap_or("")))
}

fn number(verb: &'static str, value: &str) -> Result<u64, DecodeError> {
    let bad = || DecodeError::BadNumber {
        verb,
        value: value.to_string(),
    };
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    value.parse().map_err(|_| bad())
}

fn micros(verb: &'static str, value: &str) -> Result<Time, DecodeError> {
    number(verb, value).map(Time::from_micros)
}

fn index(verb: &'static str, value: &str) -> Result<usize, DecodeError> {
    let n = number(verb, value)?;
    usize::try_from(n).map_err(|_| DecodeError::BadNumber {
        verb,
        value: value.to_string(),
    })
}

impl Command {
    pub fn decode(line: &str) -> Result<Command, DecodeError> {
        if line.is_empty() {
            return Err(DecodeError::Empty);
        }
        let (verb, rest) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, Some(rest)),
            None => (line, None),
        };
        let (name, verb, shape) =
            lookup(verb).ok_or_else(|| DecodeError::UnknownVerb(verb.to_string()))?;
        let (args, tail) = split_args(name, shape, rest)?;
        let arg = |i: usize| args[i].to_string();

        let command = match verb {
            Verb::Hello => Command::Hello {
                versions: args.iter().map(|v| v.to_string()).collect(),
            },
            Verb::Game => Command::Game {
                id: arg(0),
                name: tail.to_string(),
            },
            Verb::Cat => Command::Category {
                id: arg(0),
                name: tail.to_string(),
            },
            Verb::AddCat => Command::AddCategory {
                id: arg(0),
                name: (!tail.is_empty()).then(|| tail.to_string()),
            },
            Verb::DelCat => Command::DeleteCategory { id: arg(0) },
            Verb::ClearCats => Command::ClearCategories,
            Verb::CommitCats => Command::CommitCategories,
            Verb::Sync => Command::Sync(micros(name, args[0])?),
            Verb::Start => Command::Start(micros(name, args[0])?),
            Verb::Split => Command::Split(micros(name, args[0])?),
            Verb::Reset => Command::Reset(micros(name, args[0])?),
            Verb::NSplits => {
                let count = index(name, args[0])?;
                if count > MAX_SPLITS {
                    return Err(DecodeError::TooManySplits(count));
                }
                Command::SplitCount(count)
            }
            Verb::SplitName => Command::SplitName {
                id: index(name, args[0])?,
                name: tail.to_string(),
            },
            Verb::RecoverData => Command::RecoverData(tail.to_string()),
            Verb::RecoverAppend => Command::RecoverAppend(tail.to_string()),
            Verb::Goodbye => Command::Goodbye,
        };
        Ok(command)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Hello { .. } => "HELLO",
            Command::Game { .. } => "GAME",
            Command::Category { .. } => "CAT",
            Command::AddCategory { .. } => "ADDCAT",
            Command::DeleteCategory { .. } => "DELCAT",
            Command::ClearCategories => "CLEARCATS",
            Command::CommitCategories => "COMMITCATS",
            Command::Sync(_) => "SYNC",
            Command::Start(_) => "START",
            Command::Split(_) => "SPLIT",
            Command::Reset(_) => "RESET",
            Command::SplitCount(_) => "NSPLITS",
            Command::SplitName { .. } => "SPLITNAME",
            Command::RecoverData(_) => "RECOVERDATA",
            Command::RecoverAppend(_) => "RECOVERAPPEND",
            Command::Goodbye => "GOODBYE",
        }
    }
}

impl std::str::FromStr for Command {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::decode(s)
    }
}
