use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::registry::MutationRegistry;
use crate::source::FileTable;

/// High-level overview of the mutation opportunities in a project.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Absolute path to the project root.
    pub root: PathBuf,

    /// Number of packages the listing produced.
    pub packages: usize,

    /// Packages skipped for having no source files.
    pub skipped_packages: usize,

    /// Number of source files visited.
    pub files: usize,

    /// Total number of mutation sites discovered.
    pub mutation_sites: usize,

    /// Sites per operator tag.
    pub by_operator: BTreeMap<String, usize>,
}

impl ScanReport {
    pub fn new(
        root: PathBuf,
        packages: usize,
        skipped_packages: usize,
        ft: &FileTable,
        registry: &MutationRegistry,
    ) -> Self {
        Self {
            root,
            packages,
            skipped_packages,
            files: ft.files.len(),
            mutation_sites: registry.len(),
            by_operator: registry.by_operator(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::discover_source_file;
    use crate::mutators::default_mutators;

    #[test]
    fn report_totals_follow_the_registry() {
        let source = "pub fn f(x: i32) -> bool {\n    x != 0\n}\n";
        let mut ft = FileTable::new();
        let id = ft
            .register_source(0, PathBuf::from("src/lib.rs"), source.to_string(), false)
            .unwrap();
        let mut registry = MutationRegistry::new();
        discover_source_file(&ft.files[id], &default_mutators(), &mut registry);

        let report = ScanReport::new(PathBuf::from("/proj"), 1, 0, &ft, &registry);

        assert_eq!(report.files, 1);
        assert_eq!(report.packages, 1);
        assert_eq!(report.mutation_sites, registry.len());
        // `x != 0` carries one ROR site and two UOI sites on the literal.
        assert_eq!(report.by_operator.get("ROR_NEQ_TO_LEQ"), Some(&1));
        assert_eq!(report.by_operator.get("UOI_INC"), Some(&1));
        assert_eq!(report.by_operator.get("UOI_DEC"), Some(&1));
    }
}
