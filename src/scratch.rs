use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use tracing::debug;
use walkdir::WalkDir;

/// Directories that never belong in the scratch copy.
const SKIP_DIRS: &[&str] = &["target", ".git"];

/// Copy the project to a fresh scratch tree under the system temp directory.
///
/// The tree is exclusively owned by this run; a name collision with a
/// concurrent run is an error, not something to silently share.
pub fn copy_project(directory: &Path) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the epoch")?
        .subsec_nanos();
    let scratch = std::env::temp_dir().join(format!("MUT-{:06}", nanos % 1_000_000));
    if scratch.exists() {
        bail!("scratch directory {scratch:?} already exists; concurrent runs need distinct roots");
    }

    debug!("COPY {directory:?} to {scratch:?}");
    copy_tree(directory, &scratch)?;
    Ok(scratch)
}

/// Recursively copy `from` into `to`, skipping build output and VCS state.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            e.path() == from || !SKIP_DIRS.contains(&e.file_name().to_string_lossy().as_ref())
        })
    {
        let entry = entry?;
        let rel = entry.path().strip_prefix(from)?;
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("failed to create directory {dest:?}"))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &dest)
                .with_context(|| format!("failed to copy {:?} to {dest:?}", entry.path()))?;
        }
    }
    Ok(())
}

/// Delete a scratch tree created by `copy_project`.
pub fn remove_project_copy(directory: &Path) -> Result<()> {
    debug!("REMOVE {directory:?}");
    fs::remove_dir_all(directory)
        .with_context(|| format!("failed to remove scratch tree {directory:?}"))?;
    Ok(())
}
