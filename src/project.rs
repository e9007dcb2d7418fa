use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

/// One workspace member package, as reported by the build tool.
#[derive(Debug, Clone, Default)]
pub struct PackageInfo {
    /// Package name as cargo knows it (used with `-p`).
    pub name: String,

    /// Directory containing the package manifest.
    pub dir: PathBuf,

    /// Name of the library target, if the package has one.
    pub lib_name: Option<String>,

    /// Crate root of the library target (usually `src/lib.rs`).
    pub lib_root: Option<PathBuf>,

    /// Non-test source files, crate root first.
    pub source_files: Vec<PathBuf>,

    /// Integration-test files under `tests/`.
    pub test_files: Vec<PathBuf>,

    /// Whether the `__reach` runtime helper has been injected into one of
    /// this package's files. At most one file per package defines it.
    pub reach_defined: bool,
}

impl PackageInfo {
    /// Identifier test crates use to link the package's library.
    pub fn lib_ident(&self) -> String {
        self.lib_name
            .clone()
            .unwrap_or_else(|| self.name.replace('-', "_"))
    }

    /// Enumerate the package's `.rs` files from disk.
    ///
    /// Source files are ordered with the crate root first so that the first
    /// file written during instrumentation is always the helper's definer.
    pub fn populate_files(&mut self) -> Result<()> {
        let mut sources = collect_rs_files(&self.dir.join("src"))?;
        if let Some(root) = &self.lib_root {
            if let Some(at) = sources.iter().position(|p| p == root) {
                let root = sources.remove(at);
                sources.insert(0, root);
            }
        }
        self.source_files = sources;
        self.test_files = collect_rs_files(&self.dir.join("tests"))?;
        Ok(())
    }
}

/// All `.rs` files under `dir`, in a stable order. A missing directory is an
/// empty list, not an error.
pub fn collect_rs_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "rs")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}
