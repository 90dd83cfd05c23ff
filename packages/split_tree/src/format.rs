//! Split-definition text format.
//!
//! ```text
//! "Forest"
//! 	"Boss 1" 61000000 62500000
//! 	"Boss 2" - 130000000
//! "Final \"Boss\"" 5000000
//! ```
//!
//! Each line is a double-quoted name optionally followed by a best segment
//! and a personal best (microseconds, or `-` for unset). Tab indentation
//! nests lines: a line followed by deeper lines is a group, anything else is
//! a leaf. Times on a group line are ignored.

use std::fmt::Write as _;

use crate::error::FormatError;
use crate::time::Time;
use crate::tree::{SplitNode, SplitTree, TimesRecord};

struct Entry {
    line: usize,
    depth: usize,
    name: String,
    best_segment: Time,
    personal_best: Time,
}

/// Parse a split-definition file.
pub fn parse(input: &str) -> Result<SplitTree, FormatError> {
    let mut entries = Vec::new();
    let mut max_depth = 0;
    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let depth = raw.bytes().take_while(|b| *b == b'\t').count();
        if depth > max_depth {
            return Err(FormatError::Indentation {
                line,
                found: depth,
                expected: max_depth,
            });
        }
        entries.push(parse_line(line, depth, &raw[depth..])?);
        max_depth = depth + 1;
    }

    let mut pos = 0;
    let nodes = build(&entries, &mut pos, 0)?;
    Ok(SplitTree::new(nodes))
}

fn parse_line(line: usize, depth: usize, text: &str) -> Result<Entry, FormatError> {
    let rest = text
        .strip_prefix('"')
        .ok_or(FormatError::MissingName { line })?;

    let mut name = String::new();
    let mut chars = rest.char_indices();
    let tail = loop {
        match chars.next() {
            None => return Err(FormatError::UnterminatedName { line }),
            Some((i, '"')) => break &rest[i + 1..],
            Some((_, '\\')) => match chars.next() {
                Some((_, c)) => name.push(c),
                None => return Err(FormatError::UnterminatedName { line }),
            },
            Some((_, c)) => name.push(c),
        }
    };

    let fields: Vec<&str> = tail.split_whitespace().collect();
    if fields.len() > 2 {
        return Err(FormatError::TooManyFields { line });
    }
    let time = |i: usize| -> Result<Time, FormatError> {
        match fields.get(i) {
            None => Ok(Time::UNSET),
            Some(value) => value.parse().map_err(|_| FormatError::BadTime {
                line,
                value: value.to_string(),
            }),
        }
    };

    Ok(Entry {
        line,
        depth,
        name,
        best_segment: time(0)?,
        personal_best: time(1)?,
    })
}

fn build(entries: &[Entry], pos: &mut usize, depth: usize) -> Result<Vec<SplitNode>, FormatError> {
    let mut nodes = Vec::new();
    while let Some(entry) = entries.get(*pos) {
        if entry.depth < depth {
            break;
        }
        *pos += 1;
        let has_children = entries.get(*pos).is_some_and(|next| next.depth > depth);
        let node = if has_children {
            let children = build(entries, pos, depth + 1)?;
            SplitNode::group(entry.name.clone(), children)?
        } else {
            SplitNode::leaf_with_times(
                entry.name.clone(),
                TimesRecord {
                    best_segment: entry.best_segment,
                    personal_best: entry.personal_best,
                    ..Default::default()
                },
            )
        };
        tracing::trace!(line = entry.line, depth, name = node.name(), "parsed split");
        nodes.push(node);
    }
    Ok(nodes)
}

/// Render a tree in the split-definition format.
pub fn write(tree: &SplitTree) -> String {
    let mut out = String::new();
    write_nodes(&mut out, tree.nodes(), 0);
    out
}

fn write_nodes(out: &mut String, nodes: &[SplitNode], depth: usize) {
    for node in nodes {
        out.extend(std::iter::repeat_n('\t', depth));
        out.push('"');
        for c in node.name().chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
        match node {
            SplitNode::Leaf(leaf) => {
                let _ = writeln!(out, " {} {}", leaf.times.best_segment, leaf.times.personal_best);
            }
            SplitNode::Group(group) => {
                out.push('\n');
                write_nodes(out, group.children(), depth + 1);
            }
        }
    }
}
