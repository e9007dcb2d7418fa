mod cargo;
mod cli;
mod coverage;
mod instrument;
mod mutant;
mod mutators;
mod options;
mod out;
mod patch;
mod project;
mod registry;
mod report;
mod rewrite;
mod run_report;
mod runner;
mod scan;
mod scratch;
mod source;
mod span;
mod toolchain;
mod ui;

/// Entry point for the `reach-mutant` binary.
fn main() -> anyhow::Result<()> {
    cli::run()
}
