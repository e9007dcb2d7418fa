use serde::Serialize;

use crate::coverage::BlockKey;
use crate::mutators::MutationOperator;
use crate::patch::apply_checked_patch;
use crate::source::FileId;
use crate::span::SourceSpan;

/// Outcome of running the reaching tests against a single mutant.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum MutantOutcome {
    /// Mutant has not been executed.
    NotRun,

    /// At least one reaching test failed under this mutant.
    Killed,

    /// Every reaching test passed (or timed out) with this mutant in place.
    Survived,
}

/// A single first-order mutant: one statement rewritten in one file.
#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    /// Monotonically increasing identifier, dense over the registry.
    pub id: u64,

    /// File the mutation lives in.
    pub file: FileId,

    /// Byte offset of the opening brace of the enclosing instrumentable
    /// block. Reachability is recorded under this position.
    pub block_pos: usize,

    /// Byte range of the entire enclosing statement in the pristine buffer.
    pub stmt_span: SourceSpan,

    /// Statement source before mutation; always equals the pristine slice at
    /// `stmt_span`.
    pub original: String,

    /// Statement source after mutation; always differs from `original`.
    pub mutated: String,

    /// Operator that produced this mutant.
    pub operator: MutationOperator,

    /// Outcome of the evaluation phase.
    pub outcome: MutantOutcome,

    /// Duration of the evaluation for this mutant in milliseconds, if it ran.
    pub duration_ms: Option<u64>,
}

impl Mutation {
    /// Coordinate under which this mutant's reachability is recorded.
    pub fn block_key(&self) -> BlockKey {
        BlockKey {
            file: self.file,
            pos: self.block_pos,
        }
    }

    /// Full file contents with this mutant's statement spliced in.
    pub fn mutated_source(&self, pristine: &str) -> String {
        apply_checked_patch(pristine, self.stmt_span, &self.original, &self.mutated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutators::OperatorCategory;

    fn sample(pristine: &str, needle: &str, mutated: &str) -> Mutation {
        let start = pristine.find(needle).expect("needle in pristine");
        Mutation {
            id: 0,
            file: 0,
            block_pos: 0,
            stmt_span: SourceSpan {
                start,
                end: start + needle.len(),
            },
            original: needle.to_string(),
            mutated: mutated.to_string(),
            operator: MutationOperator {
                category: OperatorCategory::Constant,
                name: "UOI_INC",
            },
            outcome: MutantOutcome::NotRun,
            duration_ms: None,
        }
    }

    #[test]
    fn mutated_source_splices_exactly_the_statement() {
        let pristine = "fn f() {\n    let a = 0;\n    let _ = a;\n}\n";
        let m = sample(pristine, "let a = 0;", "let a = 0 + 1;");

        assert_eq!(
            m.mutated_source(pristine),
            "fn f() {\n    let a = 0 + 1;\n    let _ = a;\n}\n"
        );
    }
}
