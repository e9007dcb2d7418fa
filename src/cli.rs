use std::fs;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use clap::{Parser, Subcommand};
use rand::thread_rng;
use tracing::debug;

use crate::cargo::{BuildTool, CargoTool};
use crate::coverage::parse_coverage;
use crate::instrument::{discover_source_file, instrument_package};
use crate::mutators::default_mutators;
use crate::options::{Options, RunContext};
use crate::out::write_artifacts;
use crate::registry::{select_mutants, MutationRegistry, DEFAULT_MUTATION_CAP};
use crate::report::print_surviving_mutants;
use crate::run_report::{BaselineReport, MutationRunReport, RunSummary, SummaryReport};
use crate::runner::evaluate_mutants;
use crate::scan::ScanReport;
use crate::source::FileTable;
use crate::ui::Ui;
use crate::{scratch, toolchain};

/// Top-level CLI arguments for the `reach-mutant` binary.
#[derive(Debug, Parser)]
#[command(
    name = "reach-mutant",
    version,
    about = "Reachability-guided mutation testing for Cargo workspaces"
)]
pub struct Cli {
    /// Enable diagnostic tracing.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands supported by `reach-mutant`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover mutation opportunities without running any tests.
    Scan {
        /// Path to the project root.
        #[arg(long, default_value = ".")]
        directory: PathBuf,

        /// Restrict to one workspace package.
        #[arg(long)]
        package: Option<String>,
    },

    /// Run mutation testing.
    Run {
        /// Path to the project root; it is copied to a scratch tree first.
        #[arg(long, default_value = ".")]
        directory: PathBuf,

        /// Restrict to one workspace package.
        #[arg(long)]
        package: Option<String>,

        /// Pre-collected reachability log; skips the instrumented test runs.
        #[arg(long)]
        coverage: Option<PathBuf>,

        /// Reserved: fail instead of collecting coverage.
        #[arg(long)]
        nocov: bool,

        /// Upper bound on the number of mutants evaluated.
        #[arg(long, default_value_t = DEFAULT_MUTATION_CAP)]
        limit: usize,

        /// Directory for machine-readable artifacts.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Keep stdout machine-readable; human output goes to stderr.
        #[arg(long)]
        json: bool,

        /// Remove the scratch tree when the run completes.
        #[arg(long)]
        clean: bool,
    },
}

/// Parse CLI arguments and dispatch the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan { directory, package } => {
            let mut options = Options::new(directory);
            options.package = package;
            options.verbose = cli.verbose;
            cmd_scan(options)
        }
        Command::Run {
            directory,
            package,
            coverage,
            nocov,
            limit,
            out_dir,
            json,
            clean,
        } => {
            let mut options = Options::new(directory);
            options.package = package;
            options.coverage_file = coverage;
            options.nocov = nocov;
            options.mutation_cap = limit;
            options.out_dir = out_dir;
            options.json_output = json;
            options.clean_scratch = clean;
            options.verbose = cli.verbose;
            cmd_run(options)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "reach_mutant=debug"
    } else {
        "reach_mutant=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_scan(options: Options) -> Result<()> {
    let ui = Ui::new(false);
    ui.title("reach-mutant: scan");
    ui.line(format!("project: {:?}", options.project_root));
    ensure!(
        options.project_root.is_dir(),
        "project directory {:?} does not exist",
        options.project_root
    );

    let tool = CargoTool::new(options.cargo_cmd.clone());
    let packages = tool.list_packages(&options.project_root, options.package.as_deref())?;
    ensure!(!packages.is_empty(), "no packages matched the selection");

    let mutators = default_mutators();
    let mut ft = FileTable::new();
    let mut registry = MutationRegistry::new();
    let mut skipped = 0;
    for (pkg_index, pkg) in packages.iter().enumerate() {
        if pkg.source_files.is_empty() {
            ui.line(format!("?\t{}\t[no source files]", pkg.name));
            skipped += 1;
            continue;
        }
        for path in &pkg.source_files {
            let id = ft.register(pkg_index, path, false)?;
            let _plan = discover_source_file(&ft.files[id], &mutators, &mut registry);
        }
    }

    let report = ScanReport::new(
        options.project_root.clone(),
        packages.len(),
        skipped,
        &ft,
        &registry,
    );
    print_scan_summary(&ui, &report);
    Ok(())
}

/// Print a short summary based on the scan report.
fn print_scan_summary(ui: &Ui, report: &ScanReport) {
    ui.line("--- mutation opportunities ---");
    ui.line(format!("project root:     {}", report.root.display()));
    ui.line(format!("packages:         {}", report.packages));
    ui.line(format!("skipped packages: {}", report.skipped_packages));
    ui.line(format!("source files:     {}", report.files));
    ui.line(format!("mutation sites:   {}", report.mutation_sites));
    for (operator, count) in &report.by_operator {
        ui.line(format!("  {operator}: {count}"));
    }
}

fn cmd_run(options: Options) -> Result<()> {
    let ui = Ui::new(options.json_output);
    ui.title("reach-mutant: run");
    ui.line(format!("project: {:?}", options.project_root));

    if options.nocov {
        bail!("--nocov is reserved and not implemented");
    }
    ensure!(
        options.project_root.is_dir(),
        "project directory {:?} does not exist",
        options.project_root
    );

    match toolchain::cargo_version(&options.cargo_cmd) {
        Ok(version) => ui.line(format!("build tool: {version}")),
        Err(e) => debug!("build tool version unavailable: {e}"),
    }
    if let Ok(Some(edition)) = toolchain::edition_from_cargo_toml(&options.project_root) {
        debug!("project edition {edition}");
    }

    // Load the pre-collected coverage first so a bad path fails before the
    // copy happens.
    let mut coverage_data: Option<String> = match &options.coverage_file {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read coverage file {path:?}"))?,
        ),
        None => None,
    };

    let scratch_root = scratch::copy_project(&options.project_root)?;
    ui.line(format!("scratch: {}", scratch_root.display()));
    let ctx = RunContext::new(options, scratch_root);

    if ctx.options.verbose {
        ui.line(format!(
            "cap: {} mutants, deadline: {:?} per test",
            ctx.options.mutation_cap, ctx.test_deadline
        ));
    }

    let tool = CargoTool::new(ctx.options.cargo_cmd.clone());
    let mut packages = tool.list_packages(&ctx.scratch_root, ctx.options.package.as_deref())?;
    ensure!(!packages.is_empty(), "no packages matched the selection");

    // Instrument each package; with no coverage file this also writes the
    // probes and runs the package's tests once to produce the log.
    let write_probes = coverage_data.is_none();
    let mutators = default_mutators();
    let mut ft = FileTable::new();
    let mut registry = MutationRegistry::new();
    let mut baselines = Vec::new();
    for (pkg_index, pkg) in packages.iter_mut().enumerate() {
        let baseline = instrument_package(
            &ui,
            &tool,
            &ctx.scratch_root,
            &ctx.reach_log,
            &mut ft,
            pkg_index,
            pkg,
            &mutators,
            &mut registry,
            write_probes,
        )?;
        if let Some(run) = baseline {
            baselines.push(BaselineReport::from_run(&pkg.name, &run));
        }
    }

    let coverage_data = match coverage_data.take() {
        Some(data) => data,
        None => fs::read_to_string(&ctx.reach_log)
            .with_context(|| format!("failed to read reachability log {:?}", ctx.reach_log))?,
    };
    let reach = parse_coverage(&coverage_data);

    let reachable = registry.reachable(&reach);
    let selected = select_mutants(
        reachable.clone(),
        ctx.options.mutation_cap,
        &mut thread_rng(),
    );
    ui.line(format!(
        "discovered {} mutants ({} reachable, {} selected)",
        registry.len(),
        reachable.len(),
        selected.len()
    ));

    // The summary object is the machine-readable part of stdout.
    let summary_report = SummaryReport::new(&registry, reachable.len(), selected.len());
    println!("{}", summary_report.to_json()?);

    let mut summary = RunSummary::default();
    if selected.is_empty() {
        ui.line("no reachable mutants selected; nothing to evaluate");
    } else {
        let outcome = evaluate_mutants(
            &ui,
            &tool,
            &ctx.scratch_root,
            &ft,
            &packages,
            &mut registry,
            &reach,
            &selected,
            ctx.test_deadline,
        )?;
        summary = RunSummary {
            killed: outcome.killed,
            survived: outcome.survived,
        };

        ui.line("");
        print_surviving_mutants(&ui, &ft, &registry, &selected);
        ui.score(outcome.killed * 100 / selected.len());
    }

    if let Some(out_dir) = &ctx.options.out_dir {
        let report = MutationRunReport::new(
            ctx.options.project_root.clone(),
            ctx.scratch_root.clone(),
            &registry,
            reachable.len(),
            &selected,
            baselines,
            summary,
        );
        write_artifacts(out_dir, &ft, &registry, &report)?;
        ui.line(format!("artifacts: {}", out_dir.display()));
    }

    if ctx.options.clean_scratch {
        scratch::remove_project_copy(&ctx.scratch_root)?;
    }

    Ok(())
}
