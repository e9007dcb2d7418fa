use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::project::PackageInfo;

/// Classification of one test-runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    /// Runner exited 0.
    Passed,

    /// Runner exited non-zero (test failures and build errors alike).
    Failed,

    /// The deadline elapsed before the runner finished.
    TimedOut,
}

/// Result of running the test driver once.
#[derive(Debug)]
pub struct TestRun {
    pub status: TestStatus,

    /// Exit code, if the runner exited normally.
    pub exit_code: Option<i32>,

    /// Captured standard output (empty for deadline-bounded runs).
    pub stdout: String,

    /// Captured standard error (empty for deadline-bounded runs).
    pub stderr: String,

    /// How long the invocation ran.
    pub duration: Duration,
}

/// The external build/test driver, abstracted so tests can substitute a
/// deterministic stand-in.
pub trait BuildTool {
    /// Enumerate workspace packages under `root`, optionally filtered to one
    /// package name.
    fn list_packages(&self, root: &Path, selector: Option<&str>) -> Result<Vec<PackageInfo>>;

    /// Run the tests of `package` inside `root`. `test_name` narrows the run
    /// to a single exactly-named test. With a deadline, output is discarded
    /// and `TimedOut` is reported when the runner outlives it.
    fn run_tests(
        &self,
        root: &Path,
        package: &str,
        test_name: Option<&str>,
        deadline: Option<Duration>,
    ) -> Result<TestRun>;
}

/// Production build tool: drives `cargo` as a subprocess.
#[derive(Debug, Clone)]
pub struct CargoTool {
    cargo_cmd: String,
}

impl CargoTool {
    pub fn new(cargo_cmd: impl Into<String>) -> Self {
        Self {
            cargo_cmd: cargo_cmd.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<MetaPackage>,
}

#[derive(Debug, Deserialize)]
struct MetaPackage {
    name: String,
    manifest_path: PathBuf,
    targets: Vec<MetaTarget>,
}

#[derive(Debug, Deserialize)]
struct MetaTarget {
    name: String,
    kind: Vec<String>,
    src_path: PathBuf,
}

fn packages_from_metadata(metadata: Metadata, selector: Option<&str>) -> Vec<PackageInfo> {
    metadata
        .packages
        .into_iter()
        .filter(|p| selector.map_or(true, |wanted| wanted == p.name))
        .map(|p| {
            let lib = p
                .targets
                .iter()
                .find(|t| t.kind.iter().any(|k| k == "lib" || k == "rlib"));
            PackageInfo {
                lib_name: lib.map(|t| t.name.replace('-', "_")),
                lib_root: lib.map(|t| t.src_path.clone()),
                dir: p
                    .manifest_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
                name: p.name,
                ..PackageInfo::default()
            }
        })
        .collect()
}

impl BuildTool for CargoTool {
    fn list_packages(&self, root: &Path, selector: Option<&str>) -> Result<Vec<PackageInfo>> {
        debug!(?root, "listing packages via `{} metadata`", self.cargo_cmd);
        let output = Command::new(&self.cargo_cmd)
            .args(["metadata", "--no-deps", "--format-version", "1"])
            .current_dir(root)
            .output()
            .with_context(|| format!("failed to run `{} metadata` in {root:?}", self.cargo_cmd))?;
        if !output.status.success() {
            bail!(
                "`{} metadata` failed in {root:?}: {}",
                self.cargo_cmd,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let metadata: Metadata =
            serde_json::from_slice(&output.stdout).context("malformed build tool metadata")?;
        let mut packages = packages_from_metadata(metadata, selector);
        for pkg in &mut packages {
            pkg.populate_files()?;
        }
        Ok(packages)
    }

    fn run_tests(
        &self,
        root: &Path,
        package: &str,
        test_name: Option<&str>,
        deadline: Option<Duration>,
    ) -> Result<TestRun> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.cargo_cmd);
        cmd.arg("test").arg("-p").arg(package).current_dir(root);
        if let Some(name) = test_name {
            cmd.arg(name).args(["--", "--exact"]);
        }

        let Some(limit) = deadline else {
            let output = cmd
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .with_context(|| {
                    format!("failed to run `{} test` in {root:?}", self.cargo_cmd)
                })?;
            let status = if output.status.success() {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            return Ok(TestRun {
                status,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration: start.elapsed(),
            });
        };

        let mut child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn `{} test` in {root:?}", self.cargo_cmd))?;

        loop {
            if let Some(status) = child.try_wait().context("failed to poll test runner")? {
                let classified = if status.success() {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
                return Ok(TestRun {
                    status: classified,
                    exit_code: status.code(),
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                });
            }
            if start.elapsed() >= limit {
                // The timeout only skips the classification; the runaway
                // child still has to be reaped.
                let _ = child.kill();
                let _ = child.wait();
                return Ok(TestRun {
                    status: TestStatus::TimedOut,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: start.elapsed(),
                });
            }
            std::thread::sleep(Duration::from_millis(25));
        }
    }
}
