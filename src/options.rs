use std::path::PathBuf;
use std::time::Duration;

use crate::registry::DEFAULT_MUTATION_CAP;
use crate::runner::TEST_DEADLINE;

/// Configuration for one reach-mutant invocation, derived from the CLI.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path to the project to mutate.
    pub project_root: PathBuf,

    /// Restrict the run to one workspace package.
    pub package: Option<String>,

    /// Pre-collected reachability log; when set, instrumented files are not
    /// written and no baseline test runs happen.
    pub coverage_file: Option<PathBuf>,

    /// Reserved placeholder; rejected with an error when set.
    pub nocov: bool,

    /// Upper bound on the number of mutants evaluated.
    pub mutation_cap: usize,

    /// When true, keep stdout machine-readable and route human output to
    /// stderr.
    pub json_output: bool,

    /// Directory for machine-readable artifacts, if any.
    pub out_dir: Option<PathBuf>,

    /// Remove the scratch tree when the run completes.
    pub clean_scratch: bool,

    /// Enable diagnostic tracing.
    pub verbose: bool,

    /// Command used to invoke the build tool.
    pub cargo_cmd: String,
}

impl Options {
    /// Construct an `Options` instance with default values.
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            package: None,
            coverage_file: None,
            nocov: false,
            mutation_cap: DEFAULT_MUTATION_CAP,
            json_output: false,
            out_dir: None,
            clean_scratch: false,
            verbose: false,
            cargo_cmd: "cargo".to_string(),
        }
    }
}

/// Everything a running pipeline needs to know about where it operates.
///
/// Threading this value through the phases keeps the scratch root and the
/// log path out of process-wide state.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub options: Options,

    /// Scratch copy of the project; the run owns it exclusively.
    pub scratch_root: PathBuf,

    /// The reachability log inside the scratch tree.
    pub reach_log: PathBuf,

    /// Hard deadline for each per-test invocation during evaluation.
    pub test_deadline: Duration,
}

impl RunContext {
    pub fn new(options: Options, scratch_root: PathBuf) -> Self {
        let reach_log = scratch_root.join("reach.log");
        Self {
            options,
            scratch_root,
            reach_log,
            test_deadline: TEST_DEADLINE,
        }
    }
}
