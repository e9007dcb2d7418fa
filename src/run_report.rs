use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cargo::{TestRun, TestStatus};
use crate::mutant::Mutation;
use crate::registry::MutationRegistry;

/// The one-line JSON summary printed to stdout before evaluation.
///
/// `by_operator` counts all generated mutations, not just the selected ones.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub total_mutations: usize,
    pub reachable_mutations: usize,
    pub selected_mutations: usize,
    pub by_operator: BTreeMap<String, usize>,
}

impl SummaryReport {
    pub fn new(registry: &MutationRegistry, reachable: usize, selected: usize) -> Self {
        Self {
            total_mutations: registry.len(),
            reachable_mutations: reachable,
            selected_mutations: selected,
            by_operator: registry.by_operator(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serialize summary report")
    }
}

/// Summary counts for a mutation-testing run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct RunSummary {
    /// Mutants caught by at least one reaching test.
    pub killed: usize,

    /// Mutants every reaching test let through.
    pub survived: usize,
}

/// Baseline test-run metadata, one per instrumented package.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineReport {
    pub package: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl BaselineReport {
    pub fn from_run(package: &str, run: &TestRun) -> Self {
        Self {
            package: package.to_string(),
            success: run.status == TestStatus::Passed,
            exit_code: run.exit_code,
            duration_ms: run.duration.as_millis() as u64,
        }
    }
}

/// Machine-readable report for a whole mutation-testing run, written into
/// `--out-dir`.
#[derive(Debug, Serialize)]
pub struct MutationRunReport {
    /// Tool name, stable across versions.
    pub tool: &'static str,

    /// Current crate version.
    pub version: &'static str,

    /// The project root the run started from.
    pub project_root: PathBuf,

    /// The scratch copy the run operated on.
    pub scratch_root: PathBuf,

    /// Number of mutants discovered, before reachability filtering.
    pub discovered: usize,

    /// Number of mutants with at least one reaching test.
    pub reachable: usize,

    /// Number of mutants actually evaluated (after sampling).
    pub selected: usize,

    /// Baseline test results, one per instrumented package; empty when a
    /// pre-collected coverage file was used.
    pub baselines: Vec<BaselineReport>,

    /// Summary of mutant outcomes.
    pub summary: RunSummary,

    /// The evaluated mutants with their outcomes.
    pub mutants: Vec<Mutation>,
}

impl MutationRunReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_root: PathBuf,
        scratch_root: PathBuf,
        registry: &MutationRegistry,
        reachable: usize,
        selected: &[usize],
        baselines: Vec<BaselineReport>,
        summary: RunSummary,
    ) -> Self {
        let mut mutants: Vec<Mutation> =
            selected.iter().map(|&idx| registry.get(idx).clone()).collect();
        mutants.sort_by_key(|m| m.id);

        Self {
            tool: "reach-mutant",
            version: env!("CARGO_PKG_VERSION"),
            project_root,
            scratch_root,
            discovered: registry.len(),
            reachable,
            selected: selected.len(),
            baselines,
            summary,
            mutants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutators::{MutationOperator, OperatorCategory};
    use crate::span::SourceSpan;

    fn registry_with_operators(names: &[&'static str]) -> MutationRegistry {
        let mut registry = MutationRegistry::new();
        for name in names {
            registry.add(
                0,
                0,
                SourceSpan { start: 0, end: 1 },
                "a".into(),
                "b".into(),
                MutationOperator {
                    category: OperatorCategory::Constant,
                    name,
                },
            );
        }
        registry
    }

    #[test]
    fn summary_json_uses_camel_case_keys() {
        let registry = registry_with_operators(&["UOI_INC", "UOI_INC", "UOI_DEC"]);
        let json = SummaryReport::new(&registry, 2, 1).to_json().unwrap();

        assert_eq!(
            json,
            r#"{"totalMutations":3,"reachableMutations":2,"selectedMutations":1,"byOperator":{"UOI_DEC":1,"UOI_INC":2}}"#
        );
    }

    #[test]
    fn run_report_keeps_selected_mutants_in_id_order() {
        let registry = registry_with_operators(&["UOI_INC", "UOI_DEC", "UOI_INC"]);
        let report = MutationRunReport::new(
            PathBuf::from("/proj"),
            PathBuf::from("/tmp/MUT-000001"),
            &registry,
            3,
            &[2, 0],
            Vec::new(),
            RunSummary::default(),
        );

        assert_eq!(report.discovered, 3);
        assert_eq!(report.selected, 2);
        let ids: Vec<u64> = report.mutants.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }
}
