use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use tracing::warn;

/// How a queued change applies to the buffer.
///
/// Only `Append` is produced today; the other modes are reserved and fatal
/// if they ever reach `render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeMode {
    Append,
    Replace,
    Delete,
}

/// A pending edit at one byte position of a pristine buffer.
#[derive(Debug, Clone)]
pub struct SourceChange {
    pub mode: ChangeMode,
    pub code: String,
}

/// Ordered set of edits to apply to one source file.
///
/// Rendering never touches the pristine buffer: it emits a fresh string with
/// each payload inserted immediately before the original byte at its
/// position. `prelude` carries the import injection (position + text) and
/// `epilogue` the runtime helper appended after the last byte.
#[derive(Debug, Default)]
pub struct RewritePlan {
    changes: BTreeMap<usize, SourceChange>,
    pub prelude: Option<(usize, String)>,
    pub epilogue: Option<String>,
}

impl RewritePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.prelude.is_none() && self.epilogue.is_none()
    }

    /// Queue an `Append` at `at`. At most one change may occupy a position;
    /// the first one wins and later attempts are dropped with a warning.
    pub fn append(&mut self, at: usize, code: String) -> bool {
        match self.changes.entry(at) {
            Entry::Vacant(slot) => {
                slot.insert(SourceChange {
                    mode: ChangeMode::Append,
                    code,
                });
                true
            }
            Entry::Occupied(_) => {
                warn!(at, "dropping source change at already-occupied position");
                false
            }
        }
    }

    /// Emit the rewritten buffer.
    pub fn render(&self, pristine: &str) -> Result<String> {
        let mut inserts: Vec<(usize, &str)> = Vec::with_capacity(self.changes.len() + 1);
        if let Some((pos, text)) = &self.prelude {
            inserts.push((*pos, text));
        }
        for (pos, change) in &self.changes {
            match change.mode {
                ChangeMode::Append => inserts.push((*pos, &change.code)),
                mode => bail!("unsupported source change mode {mode:?} at byte {pos}"),
            }
        }
        // Stable by position; the prelude stays ahead of a same-position probe.
        inserts.sort_by_key(|(pos, _)| *pos);

        let mut out = String::with_capacity(pristine.len() + 256 * inserts.len());
        let mut cursor = 0;
        for (pos, text) in inserts {
            ensure!(
                pos >= cursor && pos <= pristine.len(),
                "source change at byte {pos} is outside the buffer (len {})",
                pristine.len()
            );
            out.push_str(&pristine[cursor..pos]);
            out.push_str(text);
            cursor = pos;
        }
        out.push_str(&pristine[cursor..]);

        if let Some(helper) = &self.epilogue {
            out.push_str(helper);
        }

        Ok(out)
    }
}

/// Write `contents` to `path` atomically (temp file + rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents).with_context(|| format!("failed to write {tmp:?}"))?;
    fs::rename(&tmp, path).with_context(|| format!("failed to replace {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_round_trips_pristine() {
        let pristine = "fn f() {}\n";
        let plan = RewritePlan::new();

        assert!(plan.is_empty());
        assert_eq!(plan.render(pristine).unwrap(), pristine);
    }

    #[test]
    fn payload_lands_before_the_byte_at_its_position() {
        let pristine = "fn f() { body }";
        let mut plan = RewritePlan::new();
        let at = pristine.find('{').unwrap() + 1;
        plan.append(at, "probe();".to_string());

        assert_eq!(plan.render(pristine).unwrap(), "fn f() {probe(); body }");
    }

    #[test]
    fn changes_emit_in_position_order() {
        let pristine = "abcdef";
        let mut plan = RewritePlan::new();
        plan.append(4, "2".to_string());
        plan.append(1, "1".to_string());

        assert_eq!(plan.render(pristine).unwrap(), "a1bcd2ef");
    }

    #[test]
    fn first_change_wins_at_a_position() {
        let pristine = "ab";
        let mut plan = RewritePlan::new();
        assert!(plan.append(1, "x".to_string()));
        assert!(!plan.append(1, "y".to_string()));

        assert_eq!(plan.render(pristine).unwrap(), "axb");
    }

    #[test]
    fn prelude_and_epilogue_wrap_the_buffer() {
        let pristine = "fn f() {}\n";
        let mut plan = RewritePlan::new();
        plan.prelude = Some((0, "use std::io::Write as _;\n".to_string()));
        plan.epilogue = Some("\nfn __reach() {}\n".to_string());

        assert_eq!(
            plan.render(pristine).unwrap(),
            "use std::io::Write as _;\nfn f() {}\n\nfn __reach() {}\n"
        );
    }

    #[test]
    fn reserved_modes_are_fatal() {
        let plan = RewritePlan {
            changes: [(
                0,
                SourceChange {
                    mode: ChangeMode::Delete,
                    code: String::new(),
                },
            )]
            .into_iter()
            .collect(),
            ..RewritePlan::new()
        };

        assert!(plan.render("ab").is_err());
    }

    #[test]
    fn out_of_range_position_is_an_error() {
        let mut plan = RewritePlan::new();
        plan.append(10, "x".to_string());

        assert!(plan.render("ab").is_err());
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.rs");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
