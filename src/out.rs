use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::mutant::MutantOutcome;
use crate::registry::MutationRegistry;
use crate::report::format_mutant_with_location;
use crate::run_report::MutationRunReport;
use crate::source::FileTable;

/// Write every `--out-dir` artifact for a finished run.
pub fn write_artifacts(
    out_dir: &Path,
    ft: &FileTable,
    registry: &MutationRegistry,
    report: &MutationRunReport,
) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create out dir {out_dir:?}"))?;
    write_mutants_json(out_dir, registry)?;
    write_outcomes_json(out_dir, report)?;
    write_outcome_txts(out_dir, ft, registry)?;
    write_log(out_dir, report)?;
    Ok(())
}

/// Write `mutants.json` containing all discovered mutants (pre-selection).
pub fn write_mutants_json(out_dir: &Path, registry: &MutationRegistry) -> Result<()> {
    let path = out_dir.join("mutants.json");
    write_pretty_json(&path, registry.all())
}

/// Write `outcomes.json`: the full machine-readable run report.
pub fn write_outcomes_json(out_dir: &Path, report: &MutationRunReport) -> Result<()> {
    let path = out_dir.join("outcomes.json");
    write_pretty_json(&path, report)
}

/// Write outcome lists:
/// - caught.txt (killed)
/// - missed.txt (survived)
pub fn write_outcome_txts(
    out_dir: &Path,
    ft: &FileTable,
    registry: &MutationRegistry,
) -> Result<()> {
    write_txt_for(
        out_dir.join("caught.txt"),
        ft,
        registry,
        MutantOutcome::Killed,
    )?;
    write_txt_for(
        out_dir.join("missed.txt"),
        ft,
        registry,
        MutantOutcome::Survived,
    )?;
    Ok(())
}

/// Write a stable `log` file (no timestamps) with baselines + summary.
pub fn write_log(out_dir: &Path, report: &MutationRunReport) -> Result<()> {
    let path = out_dir.join("log");

    let mut lines = Vec::new();
    lines.push(format!("tool: {}", report.tool));
    lines.push(format!("version: {}", report.version));
    lines.push(format!("project_root: {}", report.project_root.display()));
    lines.push(format!("scratch_root: {}", report.scratch_root.display()));
    lines.push(format!("discovered: {}", report.discovered));
    lines.push(format!("reachable: {}", report.reachable));
    lines.push(format!("selected: {}", report.selected));
    for baseline in &report.baselines {
        lines.push(format!(
            "baseline: package={} success={} exit_code={:?} duration_ms={}",
            baseline.package, baseline.success, baseline.exit_code, baseline.duration_ms
        ));
    }
    lines.push(format!(
        "summary: killed={} survived={}",
        report.summary.killed, report.summary.survived
    ));

    let content = lines.join("\n") + "\n";
    fs::write(&path, content).with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

fn write_txt_for(
    path: PathBuf,
    ft: &FileTable,
    registry: &MutationRegistry,
    want: MutantOutcome,
) -> Result<()> {
    let mut ordered: Vec<_> = registry
        .all()
        .iter()
        .filter(|m| m.outcome == want)
        .collect();
    ordered.sort_by_key(|m| m.id);

    // The file is created even when the list is empty.
    let mut out = String::new();
    for m in ordered {
        out.push_str(&format_mutant_with_location(ft, m));
        out.push('\n');
    }

    fs::write(&path, out).with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

// `?Sized` allows passing unsized values such as slices (e.g. `&[Mutation]` where `T = [Mutation]`).
fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, json).with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}
