use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Result};
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::{Attribute, Expr};
use tracing::{debug, trace};

use crate::cargo::{BuildTool, TestRun, TestStatus};
use crate::mutators::Mutator;
use crate::patch::apply_span_patch;
use crate::project::PackageInfo;
use crate::registry::MutationRegistry;
use crate::rewrite::{write_atomic, RewritePlan};
use crate::source::{FileTable, SourceFile};
use crate::span::SourceSpan;
use crate::ui::Ui;

/// Runtime helper appended once per package, to the crate root file.
///
/// `__reach(msg, true)` clears the process-wide seen-set and logs the test
/// marker; `__reach(msg, false)` logs a block probe at most once per test
/// execution. `write_all` is the reason the definer file needs
/// `std::io::Write` in scope.
const REACH_HELPER: &str = r#"

#[doc(hidden)]
pub struct __ReachState {
    log: std::fs::File,
    seen: std::collections::HashSet<String>,
}

#[doc(hidden)]
pub static __REACH_STATE: std::sync::OnceLock<std::sync::Mutex<__ReachState>> =
    std::sync::OnceLock::new();

#[doc(hidden)]
pub fn __reach(msg: &str, flush: bool) {
    let mut state = __REACH_STATE
        .get_or_init(|| {
            let log = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open("__REACH_LOG_PATH__")
                .expect("open reachability log");
            std::sync::Mutex::new(__ReachState {
                log,
                seen: std::collections::HashSet::new(),
            })
        })
        .lock()
        .expect("reachability state poisoned");
    if flush {
        state.seen.clear();
    } else if !state.seen.insert(msg.to_string()) {
        return;
    }
    let _ = state.log.write_all(msg.as_bytes());
    let _ = state.log.write_all(b"\n");
}
"#;

fn render_reach_helper(reach_log: &Path) -> String {
    REACH_HELPER.replace("__REACH_LOG_PATH__", &reach_log.display().to_string())
}

/// Source-file pass: walk the syntax tree collecting mutations and block
/// probes.
///
/// The visitor tracks the nearest enclosing statement and the nearest
/// enclosing block; an expression outside both (for example in a `const`
/// item) produces nothing. Patterns are never entered, so match-arm literal
/// patterns stay intact; `#[cfg(test)]` and `#[test]` items are skipped
/// entirely.
struct SourceVisitor<'a> {
    file: &'a SourceFile,
    mutators: &'a [Mutator],
    registry: &'a mut MutationRegistry,
    plan: &'a mut RewritePlan,

    /// Byte span of each enclosing statement, innermost last.
    stmt_stack: Vec<SourceSpan>,

    /// Byte offset of the `{` of each enclosing block, innermost last.
    block_stack: Vec<usize>,

    /// Blocks that already carry a probe.
    probed: HashSet<usize>,
}

impl SourceVisitor<'_> {
    fn byte_span(&self, span: proc_macro2::Span) -> SourceSpan {
        self.file.byte_span(span)
    }

    fn collect_mutations(&mut self, expr: &Expr) {
        let (Some(&block_pos), Some(&stmt_span)) =
            (self.block_stack.last(), self.stmt_stack.last())
        else {
            return;
        };

        let node_span = self.byte_span(expr.span());
        if node_span.start < stmt_span.start || node_span.end > stmt_span.end {
            trace!(?node_span, ?stmt_span, "expression escapes its statement");
            return;
        }

        let original = &self.file.pristine[stmt_span.start..stmt_span.end];
        // Node offsets relative to the statement, for the splice.
        let node_in_stmt = SourceSpan {
            start: node_span.start - stmt_span.start,
            end: node_span.end - stmt_span.start,
        };

        for mutator in self.mutators {
            let Some(replacement) = mutator.replacement(expr) else {
                continue;
            };
            let mutated = apply_span_patch(original, node_in_stmt, &replacement.to_string());
            if mutated == original {
                trace!(operator = mutator.operator.name, "replacement is a no-op");
                continue;
            }

            self.registry.add(
                self.file.id,
                block_pos,
                stmt_span,
                original.to_string(),
                mutated,
                mutator.operator,
            );

            // The probe only needs to be planned once per block.
            if self.probed.insert(block_pos) {
                self.plan.append(
                    block_pos + 1,
                    format!(
                        "crate::__reach(\"R {}:{}\", false);",
                        self.file.id, block_pos
                    ),
                );
            }
        }
    }
}

impl<'ast> Visit<'ast> for SourceVisitor<'_> {
    fn visit_block(&mut self, block: &'ast syn::Block) {
        let open = self.byte_span(block.brace_token.span.open()).start;
        self.block_stack.push(open);
        syn::visit::visit_block(self, block);
        self.block_stack.pop();
    }

    fn visit_stmt(&mut self, stmt: &'ast syn::Stmt) {
        self.stmt_stack.push(self.byte_span(stmt.span()));
        syn::visit::visit_stmt(self, stmt);
        self.stmt_stack.pop();
    }

    fn visit_expr(&mut self, expr: &'ast Expr) {
        self.collect_mutations(expr);
        syn::visit::visit_expr(self, expr);
    }

    // A pattern cannot hold `0 + 1`; never descend into them.
    fn visit_pat(&mut self, _pat: &'ast syn::Pat) {}

    fn visit_item_fn(&mut self, item: &'ast syn::ItemFn) {
        if attrs_excluded(&item.attrs) {
            return;
        }
        syn::visit::visit_item_fn(self, item);
    }

    fn visit_impl_item_fn(&mut self, item: &'ast syn::ImplItemFn) {
        if attrs_excluded(&item.attrs) {
            return;
        }
        syn::visit::visit_impl_item_fn(self, item);
    }

    fn visit_trait_item_fn(&mut self, item: &'ast syn::TraitItemFn) {
        if attrs_excluded(&item.attrs) {
            return;
        }
        syn::visit::visit_trait_item_fn(self, item);
    }

    fn visit_item_mod(&mut self, item: &'ast syn::ItemMod) {
        if attrs_excluded(&item.attrs) {
            trace!("module excluded by attributes");
            return;
        }
        syn::visit::visit_item_mod(self, item);
    }

    fn visit_item_impl(&mut self, item: &'ast syn::ItemImpl) {
        if attrs_excluded(&item.attrs) {
            return;
        }
        syn::visit::visit_item_impl(self, item);
    }
}

/// Collect every mutation in a source file and plan its block probes.
pub fn discover_source_file(
    file: &SourceFile,
    mutators: &[Mutator],
    registry: &mut MutationRegistry,
) -> RewritePlan {
    let mut plan = RewritePlan::new();
    let mut visitor = SourceVisitor {
        file,
        mutators,
        registry,
        plan: &mut plan,
        stmt_stack: Vec::new(),
        block_stack: Vec::new(),
        probed: HashSet::new(),
    };
    visitor.visit_file(&file.ast);
    plan
}

/// Test-file pass: plan a test-entry marker for every top-level `#[test]`
/// function.
///
/// The marker's position is the byte offset of the `fn` token, which is also
/// where the test's name is later derived from. The `flush = true` flag
/// scopes subsequent `R` records to this test identity.
pub fn mark_test_file(file: &SourceFile, lib_ident: &str, plan: &mut RewritePlan) {
    for item in &file.ast.items {
        let syn::Item::Fn(fun) = item else { continue };
        if !fun.attrs.iter().any(attr_is_test) {
            continue;
        }
        let fn_pos = file.byte_offset(fun.sig.fn_token.span.start());
        let body_open = file.byte_span(fun.block.brace_token.span.open()).start;
        plan.append(
            body_open + 1,
            format!("{lib_ident}::__reach(\"T {}:{fn_pos}\", true);", file.id),
        );
    }
}

/// True if any attribute marks the item as test-only.
fn attrs_excluded(attrs: &[Attribute]) -> bool {
    attrs
        .iter()
        .any(|attr| attr_is_cfg_test(attr) || attr_is_test(attr))
}

/// `#[cfg(test)]`, including `#[cfg(any(test, ...))]` forms.
fn attr_is_cfg_test(attr: &Attribute) -> bool {
    if !attr.path().is_ident("cfg") {
        return false;
    }
    let mut contains_test = false;
    if attr
        .parse_nested_meta(|meta| {
            if meta.path.is_ident("test") {
                contains_test = true;
            }
            Ok(())
        })
        .is_err()
    {
        return false;
    }
    contains_test
}

/// `#[test]`, and harness attributes like `#[tokio::test]`.
fn attr_is_test(attr: &Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|seg| seg.ident == "test")
}

/// Register, instrument and baseline-test one package.
///
/// Sources are processed before tests. With `write_probes` the rewritten
/// files land on disk and the package's whole test suite runs once to
/// produce the reachability log; the baseline must be green. Without it
/// (a pre-collected coverage file was given) files are only registered and
/// mutations discovered.
///
/// Returns the baseline test run when one was executed, `None` when the
/// package was skipped or no probes were written.
pub fn instrument_package(
    ui: &Ui,
    tool: &dyn BuildTool,
    scratch_root: &Path,
    reach_log: &Path,
    ft: &mut FileTable,
    pkg_index: usize,
    pkg: &mut PackageInfo,
    mutators: &[Mutator],
    registry: &mut MutationRegistry,
    write_probes: bool,
) -> Result<Option<TestRun>> {
    if pkg.test_files.is_empty() {
        ui.line(format!("?\t{}\t[no test files]", pkg.name));
        return Ok(None);
    }
    if pkg.source_files.is_empty() {
        ui.line(format!("?\t{}\t[no source files]", pkg.name));
        return Ok(None);
    }
    if pkg.lib_name.is_none() {
        ui.line(format!("?\t{}\t[no library target]", pkg.name));
        return Ok(None);
    }

    for path in pkg.source_files.clone() {
        let id = ft.register(pkg_index, &path, false)?;
        let file = &ft.files[id];
        let mut plan = discover_source_file(file, mutators, registry);
        if !write_probes {
            continue;
        }
        if !pkg.reach_defined {
            // The crate root comes first in source order, so the helper's
            // definer is always the file probes resolve against.
            if !file.imports_io_write() {
                let at = file.prelude_offset();
                let import = if at == 0 {
                    "use std::io::Write as _;\n".to_string()
                } else {
                    "\nuse std::io::Write as _;".to_string()
                };
                plan.prelude = Some((at, import));
            }
            plan.epilogue = Some(render_reach_helper(reach_log));
            pkg.reach_defined = true;
        }
        let rewritten = plan.render(&file.pristine)?;
        write_atomic(&file.path, &rewritten)?;
    }

    let lib_ident = pkg.lib_ident();
    for path in pkg.test_files.clone() {
        let id = ft.register(pkg_index, &path, true)?;
        let file = &ft.files[id];
        if !write_probes {
            continue;
        }
        let mut plan = RewritePlan::new();
        mark_test_file(file, &lib_ident, &mut plan);
        if plan.is_empty() {
            continue;
        }
        let rewritten = plan.render(&file.pristine)?;
        write_atomic(&file.path, &rewritten)?;
    }

    if !write_probes {
        return Ok(None);
    }

    debug!("computing coverage >> test -p {}", pkg.name);
    let run = tool.run_tests(scratch_root, &pkg.name, None, None)?;
    if run.status != TestStatus::Passed {
        if !run.stdout.is_empty() {
            ui.error(&run.stdout);
        }
        if !run.stderr.is_empty() {
            ui.error(&run.stderr);
        }
        bail!(
            "baseline test run failed for package {} (exit code: {:?})",
            pkg.name,
            run.exit_code
        );
    }
    Ok(Some(run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutators::default_mutators;
    use std::path::PathBuf;

    fn discover(source: &str) -> (FileTable, MutationRegistry, RewritePlan) {
        let mut ft = FileTable::new();
        let id = ft
            .register_source(0, PathBuf::from("src/lib.rs"), source.to_string(), false)
            .expect("register");
        let mut registry = MutationRegistry::new();
        let plan = discover_source_file(&ft.files[id], &default_mutators(), &mut registry);
        (ft, registry, plan)
    }

    #[test]
    fn literal_statement_yields_both_uoi_mutants() {
        let source = "fn f() {\n    let a = 0;\n    let _ = a;\n}\n";
        let (_ft, registry, plan) = discover(source);

        assert_eq!(registry.len(), 2);
        let body = source.find('{').unwrap();
        let mut names: Vec<&str> = registry.all().iter().map(|m| m.operator.name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["UOI_DEC", "UOI_INC"]);

        for m in registry.all() {
            assert_eq!(m.block_pos, body);
            assert_eq!(m.original, "let a = 0;");
            assert_eq!(&source[m.stmt_span.start..m.stmt_span.end], m.original);
            assert!(
                m.mutated == "let a = 0 + 1;" || m.mutated == "let a = 0 - 1;",
                "unexpected mutation {:?}",
                m.mutated
            );
        }

        let rewritten = plan.render(source).unwrap();
        assert!(rewritten.starts_with(&format!(
            "fn f() {{crate::__reach(\"R 0:{body}\", false);"
        )));
        assert_eq!(rewritten.matches("__reach").count(), 1, "one probe per block");
    }

    #[test]
    fn condition_mutant_rewrites_the_whole_if_statement() {
        let source = "fn f(x: i32, y: i32) {\n    if x != y {\n        let _ = 1;\n    }\n}\n";
        let (_ft, registry, plan) = discover(source);

        let ror = registry
            .all()
            .iter()
            .find(|m| m.operator.name == "ROR_NEQ_TO_LEQ")
            .expect("ROR mutant");
        // The condition's enclosing statement is the whole `if`; its
        // enclosing block is the function body.
        assert_eq!(ror.block_pos, source.find('{').unwrap());
        assert!(ror.original.starts_with("if x != y {"));
        assert!(ror.mutated.starts_with("if x <= y {"));

        let if_body = source.find("y {").unwrap() + 2;
        let uoi: Vec<_> = registry
            .all()
            .iter()
            .filter(|m| m.operator.name.starts_with("UOI"))
            .collect();
        assert_eq!(uoi.len(), 2);
        for m in &uoi {
            assert_eq!(m.block_pos, if_body);
            assert_eq!(m.original, "let _ = 1;");
        }

        // Both the function body and the `if` body carry probes.
        let rewritten = plan.render(source).unwrap();
        assert_eq!(rewritten.matches("__reach").count(), 2);
    }

    #[test]
    fn match_arm_blocks_are_the_instrumented_clause() {
        let source =
            "fn f(n: i32) {\n    match n {\n        0 => {}\n        _ => {\n            let _ = 1;\n        }\n    }\n}\n";
        let (_ft, registry, plan) = discover(source);

        // The pattern literal `0` is not a mutation site.
        assert_eq!(registry.len(), 2);
        let arm_block = source.find("_ => {").unwrap() + 5;
        for m in registry.all() {
            assert_eq!(m.block_pos, arm_block, "mutants key to the arm, not the match");
            assert_eq!(m.original, "let _ = 1;");
        }

        let rewritten = plan.render(source).unwrap();
        assert_eq!(rewritten.matches("__reach").count(), 1);
        assert!(rewritten.contains(&format!("_ => {{crate::__reach(\"R 0:{arm_block}\", false);")));
    }

    #[test]
    fn match_guards_are_still_mutated() {
        let source = "fn f(n: i32) -> i32 {\n    match n {\n        x if x != 0 => 1,\n        _ => 0,\n    }\n}\n";
        let (_ft, registry, _plan) = discover(source);

        assert!(registry
            .all()
            .iter()
            .any(|m| m.operator.name == "ROR_NEQ_TO_LEQ"));
    }

    #[test]
    fn test_only_code_is_not_mutated() {
        let source = "#[cfg(test)]\nmod tests {\n    fn helper() {\n        let a = 0;\n        let _ = a;\n    }\n}\n\n#[test]\nfn direct() {\n    let b = 1;\n    let _ = b;\n}\n";
        let (_ft, registry, plan) = discover(source);

        assert!(registry.is_empty());
        assert!(plan.is_empty());
    }

    #[test]
    fn expressions_without_an_enclosing_block_produce_nothing() {
        let source = "pub const LIMIT: usize = 10;\n";
        let (_ft, registry, _plan) = discover(source);

        assert!(registry.is_empty());
    }

    #[test]
    fn test_markers_target_test_functions_only() {
        let source = "use demo::add;\n\n#[test]\nfn adds() {\n    assert_eq!(add(1, 2), 3);\n}\n\nfn helper() {}\n";
        let mut ft = FileTable::new();
        let id = ft
            .register_source(3, PathBuf::from("tests/basic.rs"), source.to_string(), true)
            .unwrap();
        let mut plan = RewritePlan::new();
        mark_test_file(&ft.files[id], "demo", &mut plan);

        let fn_pos = source.find("fn adds").unwrap();
        let rewritten = plan.render(source).unwrap();
        assert_eq!(rewritten.matches("__reach").count(), 1);
        assert!(rewritten.contains(&format!(
            "fn adds() {{demo::__reach(\"T 0:{fn_pos}\", true);"
        )));
    }

    #[test]
    fn harness_test_attributes_are_recognised() {
        let attr: Attribute = syn::parse_quote!(#[tokio::test]);
        assert!(attr_is_test(&attr));
        let attr: Attribute = syn::parse_quote!(#[cfg(any(test, feature = "x"))]);
        assert!(attr_is_cfg_test(&attr));
        let attr: Attribute = syn::parse_quote!(#[cfg(feature = "x")]);
        assert!(!attr_is_cfg_test(&attr));
    }

    #[test]
    fn helper_template_carries_the_log_path() {
        let helper = render_reach_helper(Path::new("/tmp/MUT-000001/reach.log"));
        assert!(helper.contains(".open(\"/tmp/MUT-000001/reach.log\")"));
        assert!(helper.contains("pub fn __reach(msg: &str, flush: bool)"));
    }

    use crate::cargo::TestRun;
    use crate::ui::Ui;
    use std::cell::RefCell;
    use std::fs;
    use std::time::Duration;

    struct BaselineTool {
        status: TestStatus,
        calls: RefCell<Vec<(String, Option<String>)>>,
    }

    impl BaselineTool {
        fn new(status: TestStatus) -> Self {
            Self {
                status,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl BuildTool for BaselineTool {
        fn list_packages(
            &self,
            _root: &Path,
            _selector: Option<&str>,
        ) -> Result<Vec<PackageInfo>> {
            unimplemented!("not used by the instrumenter")
        }

        fn run_tests(
            &self,
            _root: &Path,
            package: &str,
            test_name: Option<&str>,
            deadline: Option<Duration>,
        ) -> Result<TestRun> {
            assert_eq!(deadline, None, "the baseline run is not deadline-bounded");
            self.calls
                .borrow_mut()
                .push((package.to_string(), test_name.map(str::to_string)));
            Ok(TestRun {
                status: self.status,
                exit_code: Some(if self.status == TestStatus::Passed { 0 } else { 101 }),
                stdout: String::new(),
                stderr: String::new(),
                duration: Duration::from_millis(1),
            })
        }
    }

    struct PackageFixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        pkg: PackageInfo,
    }

    fn package_fixture() -> PackageFixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(
            root.join("src/lib.rs"),
            "pub mod util;\n\npub fn f() -> i32 {\n    let a = 0;\n    a\n}\n",
        )
        .unwrap();
        fs::write(
            root.join("src/util.rs"),
            "pub fn g() -> i32 {\n    let b = 1;\n    b\n}\n",
        )
        .unwrap();
        fs::write(
            root.join("tests/basic.rs"),
            "#[test]\nfn covers() {\n    demo::f();\n}\n",
        )
        .unwrap();

        let pkg = PackageInfo {
            name: "demo".into(),
            dir: root.clone(),
            lib_name: Some("demo".into()),
            lib_root: Some(root.join("src/lib.rs")),
            source_files: vec![root.join("src/lib.rs"), root.join("src/util.rs")],
            test_files: vec![root.join("tests/basic.rs")],
            reach_defined: false,
        };

        PackageFixture {
            _dir: dir,
            root,
            pkg,
        }
    }

    #[test]
    fn helper_is_defined_once_and_probes_reference_it() {
        let mut fx = package_fixture();
        let tool = BaselineTool::new(TestStatus::Passed);
        let ui = Ui::silent();
        let mut ft = FileTable::new();
        let mut registry = MutationRegistry::new();

        let baseline = instrument_package(
            &ui,
            &tool,
            &fx.root,
            &fx.root.join("reach.log"),
            &mut ft,
            0,
            &mut fx.pkg,
            &default_mutators(),
            &mut registry,
            true,
        )
        .expect("instrumentation succeeds");

        assert!(baseline.is_some());
        assert!(fx.pkg.reach_defined);
        assert_eq!(
            tool.calls.borrow().as_slice(),
            [("demo".to_string(), None::<String>)]
        );

        // Exactly one helper definition, in the crate root, with its import.
        let lib = fs::read_to_string(fx.root.join("src/lib.rs")).unwrap();
        assert_eq!(lib.matches("pub fn __reach").count(), 1);
        assert_eq!(lib.matches("use std::io::Write as _;").count(), 1);
        assert!(lib.contains("crate::__reach(\"R 0:"));

        let util = fs::read_to_string(fx.root.join("src/util.rs")).unwrap();
        assert!(!util.contains("pub fn __reach"));
        assert!(!util.contains("use std::io::Write"));
        assert!(util.contains("crate::__reach(\"R 1:"));

        // The test crate links the helper through the library name.
        let test = fs::read_to_string(fx.root.join("tests/basic.rs")).unwrap();
        assert!(test.contains("demo::__reach(\"T 2:"));

        // Both source files contributed mutants.
        assert!(registry.all().iter().any(|m| m.file == 0));
        assert!(registry.all().iter().any(|m| m.file == 1));
    }

    #[test]
    fn coverage_mode_registers_without_writing() {
        let mut fx = package_fixture();
        let before = fs::read_to_string(fx.root.join("src/lib.rs")).unwrap();
        let tool = BaselineTool::new(TestStatus::Passed);
        let ui = Ui::silent();
        let mut ft = FileTable::new();
        let mut registry = MutationRegistry::new();

        let baseline = instrument_package(
            &ui,
            &tool,
            &fx.root,
            &fx.root.join("reach.log"),
            &mut ft,
            0,
            &mut fx.pkg,
            &default_mutators(),
            &mut registry,
            false,
        )
        .expect("registration succeeds");

        assert!(baseline.is_none());
        assert!(tool.calls.borrow().is_empty());
        assert_eq!(ft.files.len(), 3);
        assert!(!registry.is_empty());
        assert_eq!(
            fs::read_to_string(fx.root.join("src/lib.rs")).unwrap(),
            before
        );
    }

    #[test]
    fn packages_without_tests_or_sources_are_skipped() {
        let mut fx = package_fixture();
        fx.pkg.test_files.clear();
        let tool = BaselineTool::new(TestStatus::Passed);
        let ui = Ui::silent();
        let mut ft = FileTable::new();
        let mut registry = MutationRegistry::new();

        let baseline = instrument_package(
            &ui,
            &tool,
            &fx.root,
            &fx.root.join("reach.log"),
            &mut ft,
            0,
            &mut fx.pkg,
            &default_mutators(),
            &mut registry,
            true,
        )
        .expect("skip is not an error");

        assert!(baseline.is_none());
        assert!(ft.files.is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn red_baseline_is_fatal() {
        let mut fx = package_fixture();
        let tool = BaselineTool::new(TestStatus::Failed);
        let ui = Ui::silent();
        let mut ft = FileTable::new();
        let mut registry = MutationRegistry::new();

        let result = instrument_package(
            &ui,
            &tool,
            &fx.root,
            &fx.root.join("reach.log"),
            &mut ft,
            0,
            &mut fx.pkg,
            &default_mutators(),
            &mut registry,
            true,
        );

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("baseline"));
    }
}
