use std::collections::HashMap;

use serde::Serialize;
use tracing::{trace, warn};

use crate::source::FileId;

/// Coordinate of an instrumented node: a file and a byte position inside it.
///
/// Block probes point at the opening brace of the instrumented block; test
/// markers point at the test function's `fn` token. The pair is the key used
/// in the reachability log and in every cross-phase lookup.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
pub struct NodeKey {
    pub file: FileId,
    pub pos: usize,
}

/// A block key, as written by `R` records.
pub type BlockKey = NodeKey;

/// A key pointing at a test function, as written by `T` records.
pub type TestKey = NodeKey;

/// For each instrumented block, the tests that reached it.
///
/// A test may appear multiple times; duplicates are harmless and preserved.
pub type ReachMap = HashMap<BlockKey, Vec<TestKey>>;

/// Reconstruct the block → tests relation from a reachability log.
///
/// One record per line, `T <fid>:<pos>` or `R <fid>:<pos>`. A `T` record
/// moves the implicit current-test cursor; an `R` record appends the current
/// test to its block's list. Ill-formed lines are skipped with a warning.
/// `R` records seen before any `T` have no test identity and are dropped
/// (they come from uninstrumented entry points sharing the process).
pub fn parse_coverage(log: &str) -> ReachMap {
    let mut current_test: Option<TestKey> = None;
    let mut tests_per_block = ReachMap::new();

    for line in log.lines() {
        if line.is_empty() {
            continue;
        }
        let Some((tag, key)) = parse_record(line) else {
            warn!(?line, "skipping malformed coverage record");
            continue;
        };
        match tag {
            Tag::Test => current_test = Some(key),
            Tag::Reach => match current_test {
                Some(test) => tests_per_block.entry(key).or_default().push(test),
                None => trace!(?key, "reach record before any test marker"),
            },
        }
    }

    tests_per_block
}

enum Tag {
    Test,
    Reach,
}

fn parse_record(line: &str) -> Option<(Tag, NodeKey)> {
    let mut fields = line.split(' ');
    let tag = match fields.next()? {
        "T" => Tag::Test,
        "R" => Tag::Reach,
        _ => return None,
    };
    let ident = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    let (file, pos) = ident.split_once(':')?;
    let key = NodeKey {
        file: file.parse().ok()?,
        pos: pos.parse().ok()?,
    };
    Some((tag, key))
}
