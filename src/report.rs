use crate::mutant::{MutantOutcome, Mutation};
use crate::registry::MutationRegistry;
use crate::source::FileTable;
use crate::ui::Ui;

/// The textual diff of one surviving mutant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurvivorDiff {
    pub header: String,
    pub original: String,
    pub mutated: String,
}

/// Survivors among the selected mutants, in registry order.
pub fn surviving_mutants(
    ft: &FileTable,
    registry: &MutationRegistry,
    selected: &[usize],
) -> Vec<SurvivorDiff> {
    let mut ordered: Vec<&Mutation> = selected
        .iter()
        .map(|&idx| registry.get(idx))
        .filter(|m| m.outcome == MutantOutcome::Survived)
        .collect();
    ordered.sort_by_key(|m| m.id);

    ordered
        .into_iter()
        .map(|m| SurvivorDiff {
            header: format!(
                "MUTANT SURVIVED: {}, {}",
                m.operator.name,
                ft.files[m.file].path.display()
            ),
            original: m.original.clone(),
            mutated: m.mutated.clone(),
        })
        .collect()
}

/// Print each survivor's diff, old statement in red, new in green.
pub fn print_surviving_mutants(
    ui: &Ui,
    ft: &FileTable,
    registry: &MutationRegistry,
    selected: &[usize],
) {
    for diff in surviving_mutants(ft, registry, selected) {
        ui.survivor(&diff.header, &diff.original, &diff.mutated);
    }
}

/// Format one mutant as a single, readable line using line/column positions.
pub fn format_mutant_with_location(ft: &FileTable, m: &Mutation) -> String {
    let file = &ft.files[m.file];

    let Some((sl, sc)) = line_col_at(&file.pristine, m.stmt_span.start) else {
        return format_mutant_short(ft, m);
    };
    let Some((el, ec)) = line_col_at(&file.pristine, m.stmt_span.end) else {
        return format_mutant_short(ft, m);
    };

    format!(
        "#{id} {file}:{sl}:{sc}-{el}:{ec} {category:?}/{name}: {orig:?} -> {mutated:?}",
        id = m.id,
        file = file.path.display(),
        category = m.operator.category,
        name = m.operator.name,
        orig = m.original,
        mutated = m.mutated,
    )
}

/// Format one mutant as a single, readable line with byte offsets.
pub fn format_mutant_short(ft: &FileTable, m: &Mutation) -> String {
    format!(
        "#{id} {file} [{start}..{end}] {category:?}/{name}: {orig:?} -> {mutated:?}",
        id = m.id,
        file = ft.files[m.file].path.display(),
        start = m.stmt_span.start,
        end = m.stmt_span.end,
        category = m.operator.category,
        name = m.operator.name,
        orig = m.original,
        mutated = m.mutated,
    )
}

/// 1-based line and character column of a byte offset, walking the buffer
/// one line segment at a time. `None` when the offset is past the end.
fn line_col_at(code: &str, offset: usize) -> Option<(usize, usize)> {
    if offset > code.len() {
        return None;
    }

    let mut seg_start = 0;
    for (row, seg) in code.split_inclusive('\n').enumerate() {
        let seg_end = seg_start + seg.len();
        // An offset sitting on the final, unterminated segment's end byte
        // still belongs to that segment.
        if offset < seg_end || (offset == seg_end && !seg.ends_with('\n')) {
            let column = code[seg_start..offset].chars().count() + 1;
            return Some((row + 1, column));
        }
        seg_start = seg_end;
    }

    // Only reachable for an empty buffer or an offset just past a trailing
    // newline.
    Some((code.split_inclusive('\n').count() + 1, 1))
}
