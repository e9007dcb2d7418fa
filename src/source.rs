use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use syn::spanned::Spanned;
use syn::UseTree;

use proc_macro2::LineColumn;

use crate::coverage::TestKey;
use crate::span::{LineIndex, SourceSpan};

/// Dense integer id of a registered source file, assigned in registration
/// order.
pub type FileId = usize;

/// One parsed source file of the project under mutation.
///
/// The pristine buffer is immutable after load; every rewrite renders a new
/// buffer from it.
pub struct SourceFile {
    pub id: FileId,

    /// Index of the owning package.
    pub package: usize,

    /// Absolute path on disk (inside the scratch tree).
    pub path: PathBuf,

    /// File contents as read from disk, never modified.
    pub pristine: String,

    pub ast: syn::File,

    /// Flattened `use` paths already present in the file.
    pub imports: HashSet<String>,

    /// True for files under `tests/`.
    pub is_test: bool,

    line_index: LineIndex,

    /// Bytes the parser skipped before lexing (BOM, shebang line); span
    /// positions are relative to the buffer after this prefix.
    base: usize,
}

impl SourceFile {
    fn from_source(
        id: FileId,
        package: usize,
        path: PathBuf,
        pristine: String,
        is_test: bool,
    ) -> Result<Self> {
        let ast =
            syn::parse_file(&pristine).with_context(|| format!("failed to parse {path:?}"))?;
        let imports = collect_imports(&ast);
        let base = parse_offset_base(&pristine);
        let line_index = LineIndex::new(&pristine[base..]);
        Ok(Self {
            id,
            package,
            path,
            pristine,
            ast,
            imports,
            is_test,
            line_index,
            base,
        })
    }

    /// Byte offset in the pristine buffer of a span position.
    pub fn byte_offset(&self, pos: LineColumn) -> usize {
        self.base + self.line_index.offset(&self.pristine[self.base..], pos)
    }

    /// Byte range in the pristine buffer covered by a span.
    pub fn byte_span(&self, span: proc_macro2::Span) -> SourceSpan {
        let raw = self.line_index.span_of(&self.pristine[self.base..], span);
        SourceSpan {
            start: self.base + raw.start,
            end: self.base + raw.end,
        }
    }

    /// Whether `std::io::Write` is already in scope through a `use` item.
    pub fn imports_io_write(&self) -> bool {
        self.imports.contains("std::io::Write") || self.imports.contains("std::io::*")
    }

    /// Byte offset where injected `use` items may start: just past the inner
    /// attributes (and shebang), which must stay first in the file.
    pub fn prelude_offset(&self) -> usize {
        if let Some(attr) = self.ast.attrs.last() {
            return self.byte_span(attr.span()).end;
        }
        self.base
    }
}

/// Length of the prefix `syn::parse_file` strips before lexing: a UTF-8 BOM
/// and a shebang line (but not `#![...]`). Span positions start after it.
fn parse_offset_base(content: &str) -> usize {
    let mut base = 0;
    let rest = match content.strip_prefix('\u{feff}') {
        Some(rest) => {
            base += '\u{feff}'.len_utf8();
            rest
        }
        None => content,
    };
    if rest.starts_with("#!") && !rest[2..].trim_start().starts_with('[') {
        match rest.find('\n') {
            Some(newline) => base += newline,
            None => base += rest.len(),
        }
    }
    base
}

/// Registry of every file touched by the run, indexed by `FileId`.
#[derive(Default)]
pub struct FileTable {
    pub files: Vec<SourceFile>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and parse a file from disk, assigning the next dense id.
    pub fn register(&mut self, package: usize, path: &Path, is_test: bool) -> Result<FileId> {
        let pristine =
            fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
        self.register_source(package, path.to_path_buf(), pristine, is_test)
    }

    /// Register a file from an in-memory buffer.
    pub fn register_source(
        &mut self,
        package: usize,
        path: PathBuf,
        pristine: String,
        is_test: bool,
    ) -> Result<FileId> {
        let id = self.files.len();
        let file = SourceFile::from_source(id, package, path, pristine, is_test)?;
        self.files.push(file);
        Ok(id)
    }

    /// Derive a test's name from the pristine buffer its key points into.
    ///
    /// The key's position is the byte offset of the `fn` token; the name is
    /// the identifier following it.
    pub fn derive_test_name(&self, test: &TestKey) -> Result<String> {
        let file = self
            .files
            .get(test.file)
            .with_context(|| format!("coverage references unknown file id {}", test.file))?;
        let tail = file
            .pristine
            .get(test.pos..)
            .with_context(|| format!("position {} out of range in {:?}", test.pos, file.path))?;
        let tail = tail
            .strip_prefix("fn")
            .with_context(|| format!("no function at byte {} of {:?}", test.pos, file.path))?;
        let name: String = tail
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        ensure!(
            !name.is_empty(),
            "empty test name at byte {} of {:?}",
            test.pos,
            file.path
        );
        Ok(name)
    }
}

fn collect_imports(ast: &syn::File) -> HashSet<String> {
    let mut out = HashSet::new();
    for item in &ast.items {
        if let syn::Item::Use(item_use) = item {
            flatten_use_tree(String::new(), &item_use.tree, &mut out);
        }
    }
    out
}

fn flatten_use_tree(prefix: String, tree: &UseTree, out: &mut HashSet<String>) {
    let join = |ident: &syn::Ident| {
        if prefix.is_empty() {
            ident.to_string()
        } else {
            format!("{prefix}::{ident}")
        }
    };
    match tree {
        UseTree::Path(path) => {
            let next = join(&path.ident);
            flatten_use_tree(next, &path.tree, out);
        }
        UseTree::Name(name) => {
            out.insert(join(&name.ident));
        }
        // The original path is what matters for scope, not the alias.
        UseTree::Rename(rename) => {
            out.insert(join(&rename.ident));
        }
        UseTree::Glob(_) => {
            out.insert(format!("{prefix}::*"));
        }
        UseTree::Group(group) => {
            for item in &group.items {
                flatten_use_tree(prefix.clone(), item, out);
            }
        }
    }
}
