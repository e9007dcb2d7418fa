use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::debug;

use crate::cargo::{BuildTool, TestStatus};
use crate::coverage::ReachMap;
use crate::mutant::MutantOutcome;
use crate::project::PackageInfo;
use crate::registry::MutationRegistry;
use crate::rewrite::write_atomic;
use crate::source::FileTable;
use crate::ui::Ui;

/// Hard per-test deadline during mutant evaluation.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

/// Outcome counts over the selected mutants.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvalSummary {
    pub killed: usize,
    pub survived: usize,
}

/// Write every registered file back to its pristine bytes.
pub fn restore_pristine(ft: &FileTable) -> Result<()> {
    for file in &ft.files {
        write_atomic(&file.path, &file.pristine)?;
    }
    Ok(())
}

/// Evaluate the selected mutants, in selection order.
///
/// The cycle per mutant is: write the mutated statement, run each reaching
/// test under the deadline, restore the file. A timed-out test neither kills
/// nor confirms survival; a non-zero runner exit kills and stops the test
/// loop. At any instant at most one file on disk differs from pristine, by
/// exactly one statement.
pub fn evaluate_mutants(
    ui: &Ui,
    tool: &dyn BuildTool,
    root: &Path,
    ft: &FileTable,
    packages: &[PackageInfo],
    registry: &mut MutationRegistry,
    reach: &ReachMap,
    selected: &[usize],
    deadline: Duration,
) -> Result<EvalSummary> {
    // Undo the instrumentation before the first mutant goes in.
    restore_pristine(ft)?;

    let mut summary = EvalSummary::default();

    for &idx in selected {
        let started = Instant::now();
        let (path, mutated_source, key) = {
            let m = registry.get(idx);
            let file = &ft.files[m.file];
            (
                file.path.clone(),
                m.mutated_source(&file.pristine),
                m.block_key(),
            )
        };

        registry.get_mut(idx).outcome = MutantOutcome::Survived;
        write_atomic(&path, &mutated_source)?;

        let tests = reach.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        for test in tests {
            let name = ft.derive_test_name(test)?;
            let package = &packages[ft.files[test.file].package].name;
            debug!("test -p {package} {name} -- --exact");

            let run = tool.run_tests(root, package, Some(&name), Some(deadline))?;
            match run.status {
                TestStatus::TimedOut => {
                    ui.line(format!("SKIP: test {name} timed out"));
                }
                TestStatus::Failed => {
                    registry.get_mut(idx).outcome = MutantOutcome::Killed;
                    break;
                }
                TestStatus::Passed => {}
            }
        }

        // Back to pristine before the next mutant touches anything.
        write_atomic(&path, &ft.files[registry.get(idx).file].pristine)?;

        let mutation = registry.get_mut(idx);
        mutation.duration_ms = Some(started.elapsed().as_millis() as u64);
        match mutation.outcome {
            MutantOutcome::Killed => summary.killed += 1,
            MutantOutcome::Survived => summary.survived += 1,
            MutantOutcome::NotRun => {}
        }

        ui.mutant_progress(registry.get(idx), &path);
    }

    Ok(summary)
}
