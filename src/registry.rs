use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::coverage::{BlockKey, ReachMap};
use crate::mutant::{MutantOutcome, Mutation};
use crate::mutators::MutationOperator;
use crate::source::FileId;
use crate::span::SourceSpan;

/// Upper bound on the number of mutants evaluated in one run.
pub const DEFAULT_MUTATION_CAP: usize = 1000;

/// Catalog of every candidate mutant discovered during instrumentation,
/// indexed by id and by enclosing block.
#[derive(Default)]
pub struct MutationRegistry {
    mutations: Vec<Mutation>,
    by_block: HashMap<BlockKey, Vec<usize>>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mutation, assigning the next dense id.
    pub fn add(
        &mut self,
        file: FileId,
        block_pos: usize,
        stmt_span: SourceSpan,
        original: String,
        mutated: String,
        operator: MutationOperator,
    ) -> usize {
        let idx = self.mutations.len();
        let mutation = Mutation {
            id: idx as u64,
            file,
            block_pos,
            stmt_span,
            original,
            mutated,
            operator,
            outcome: MutantOutcome::NotRun,
            duration_ms: None,
        };
        self.by_block
            .entry(mutation.block_key())
            .or_default()
            .push(idx);
        self.mutations.push(mutation);
        idx
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn all(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn get(&self, idx: usize) -> &Mutation {
        &self.mutations[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut Mutation {
        &mut self.mutations[idx]
    }

    /// Counts of generated mutants per operator tag, over the whole catalog.
    pub fn by_operator(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for m in &self.mutations {
            *counts.entry(m.operator.name.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Ids of mutants whose enclosing block appears in the reach map,
    /// sorted for determinism.
    pub fn reachable(&self, reach: &ReachMap) -> Vec<usize> {
        let mut ids: Vec<usize> = reach
            .keys()
            .filter_map(|key| self.by_block.get(key))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Uniformly sample at most `cap` mutants from the reachable set.
///
/// A uniform permutation preserves per-operator proportions in expectation
/// while bounding experiment time.
pub fn select_mutants(mut reachable: Vec<usize>, cap: usize, rng: &mut impl Rng) -> Vec<usize> {
    reachable.shuffle(rng);
    reachable.truncate(cap);
    reachable
}
