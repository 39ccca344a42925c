//! # Protein Grouping and Razor Assignment
//!
//! Attributes every identified peptide to the protein(s) it most plausibly
//! came from.
//!
//! Peptides that map to a single protein are unambiguous. Peptides shared by
//! several proteins form a bipartite graph with their candidate proteins;
//! each connected component is resolved independently by a greedy set cover:
//! the protein explaining the most peptides (shared and unambiguous) takes all
//! of its remaining shared peptides as "razor" peptides, and the process
//! repeats until every shared peptide is assigned.
//!
//! ## Determinism
//! - Components are processed in order of their smallest row.
//! - Ties on peptide count go to the lowest protein index, unless the tied
//!   proteins explain exactly the same peptides: those are reported together
//!   as one group.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;

use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::database::{PeptideProteinIndex, ProteinIx};
use crate::fasta::Fasta;
use crate::fdr::{Competitor, Ranked};

/// Prefix for protein names in the decoy pass
pub const DECOY_PREFIX: &str = "REV__";

/// A scored identification that names the peptide it matched
pub trait Identification: Competitor {
    fn sequence(&self) -> &str;
}

impl<T: Identification> Identification for Ranked<T> {
    fn sequence(&self) -> &str {
        self.row.sequence()
    }
}

impl<T: Identification + ?Sized> Identification for &T {
    fn sequence(&self) -> &str {
        (**self).sequence()
    }
}

/// Protein(s) a shared peptide was attributed to
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ProteinKey {
    Single(ProteinIx),
    /// Proteins with identical peptide evidence, ascending
    Group(Vec<ProteinIx>),
}

impl ProteinKey {
    pub fn members(&self) -> &[ProteinIx] {
        match self {
            ProteinKey::Single(ix) => std::slice::from_ref(ix),
            ProteinKey::Group(ixs) => ixs,
        }
    }
}

/// Per-row protein annotation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProteinAnnotation {
    /// Protein(s) the row is attributed to
    pub protein: String,
    /// Every protein the peptide occurs in
    pub protein_group: String,
    /// Was the protein chosen by razor assignment?
    pub razor: bool,
    pub protein_idx: Vec<u32>,
}

/// Unambiguous and shared peptide rows
#[derive(Debug, Default)]
pub struct Assignment<'a> {
    /// Protein -> rows whose peptide occurs only in that protein
    pub unique: BTreeMap<ProteinIx, Vec<usize>>,
    /// Rows whose peptide occurs in several proteins, ascending by row
    pub shared: Vec<(usize, &'a [ProteinIx])>,
}

/// Look up the candidate proteins of every row.
///
/// # Panics
/// If a row's peptide is missing from the index: identifications must come
/// from the same library the index was built from.
pub fn assign_proteins<'a, T: Identification>(
    rows: &[T],
    index: &'a PeptideProteinIndex,
) -> Assignment<'a> {
    let mut assignment = Assignment::default();
    for (row, id) in rows.iter().enumerate() {
        match lookup(index, id.sequence()) {
            [protein] => assignment.unique.entry(*protein).or_default().push(row),
            proteins => assignment.shared.push((row, proteins)),
        }
    }
    assignment
}

fn lookup<'a>(index: &'a PeptideProteinIndex, sequence: &str) -> &'a [ProteinIx] {
    match index.get(sequence) {
        Some(proteins) if !proteins.is_empty() => proteins,
        _ => panic!("BUG: peptide {} is not in the protein index", sequence),
    }
}

/// Bipartite graph between shared rows and their proteins, addressed by
/// stable integer ids
struct Graph {
    proteins: Vec<ProteinIx>,
    /// Row node -> protein nodes
    row_edges: Vec<Vec<usize>>,
    /// Protein node -> row nodes still in the graph
    protein_edges: Vec<BTreeSet<usize>>,
}

impl Graph {
    fn new(shared: &[(usize, &[ProteinIx])]) -> Self {
        let proteins = shared
            .iter()
            .flat_map(|(_, proteins)| proteins.iter().copied())
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        let mut protein_edges = vec![BTreeSet::new(); proteins.len()];
        let row_edges = shared
            .iter()
            .enumerate()
            .map(|(row_node, (_, candidates))| {
                candidates
                    .iter()
                    .filter_map(|ix| proteins.binary_search(ix).ok())
                    .inspect(|&node| {
                        protein_edges[node].insert(row_node);
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Graph {
            proteins,
            row_edges,
            protein_edges,
        }
    }

    /// Protein nodes of every connected component, in order of the
    /// component's first row node
    fn components(&self) -> Vec<Vec<usize>> {
        let mut seen_rows = vec![false; self.row_edges.len()];
        let mut seen_proteins = vec![false; self.proteins.len()];
        let mut components = Vec::new();

        for start in 0..self.row_edges.len() {
            if seen_rows[start] {
                continue;
            }
            seen_rows[start] = true;
            let mut component = Vec::new();
            let mut queue = VecDeque::from([start]);
            while let Some(row) = queue.pop_front() {
                for &protein in &self.row_edges[row] {
                    if seen_proteins[protein] {
                        continue;
                    }
                    seen_proteins[protein] = true;
                    component.push(protein);
                    for &next in &self.protein_edges[protein] {
                        if !seen_rows[next] {
                            seen_rows[next] = true;
                            queue.push_back(next);
                        }
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    fn remove_row(&mut self, row: usize) {
        for &protein in &self.row_edges[row] {
            self.protein_edges[protein].remove(&row);
        }
    }
}

/// Resolve shared rows to razor proteins. Returns row -> protein key for
/// every shared row.
pub fn get_shared_proteins(assignment: &Assignment) -> BTreeMap<usize, ProteinKey> {
    let mut graph = Graph::new(&assignment.shared);
    let mut razor = BTreeMap::new();
    let no_rows = Vec::new();

    for component in graph.components() {
        loop {
            let support = |graph: &Graph, node: usize| {
                let unique = assignment
                    .unique
                    .get(&graph.proteins[node])
                    .unwrap_or(&no_rows);
                (graph.protein_edges[node].len() + unique.len(), unique)
            };

            // Nodes are sorted by protein index: strict `>` keeps the lowest
            let mut winner: Option<(usize, usize)> = None;
            for &node in &component {
                let (count, _) = support(&graph, node);
                if graph.protein_edges[node].is_empty() {
                    continue;
                }
                if winner.map_or(true, |(_, best)| count > best) {
                    winner = Some((node, count));
                }
            }
            let Some((winner, count)) = winner else {
                break;
            };

            let (_, winner_unique) = support(&graph, winner);
            let tied = component
                .iter()
                .copied()
                .filter(|&node| {
                    let (c, unique) = support(&graph, node);
                    node == winner
                        || (c == count
                            && graph.protein_edges[node] == graph.protein_edges[winner]
                            && unique == winner_unique)
                })
                .map(|node| graph.proteins[node])
                .collect::<Vec<_>>();

            let key = match tied.as_slice() {
                [single] => ProteinKey::Single(*single),
                _ => ProteinKey::Group(tied),
            };

            let rows = graph.protein_edges[winner].iter().copied().collect::<Vec<_>>();
            for row in rows {
                graph.remove_row(row);
                razor.insert(assignment.shared[row].0, key.clone());
            }
        }
    }
    razor
}

fn protein_name(fasta: &Fasta, ix: ProteinIx, decoy: bool) -> String {
    match decoy {
        true => format!("{}{}", DECOY_PREFIX, fasta[ix].id),
        false => fasta[ix].id.clone(),
    }
}

/// Annotate every row with its protein, protein group and razor flag.
/// `decoy` selects decoy naming for the proteins.
pub fn get_protein_groups<T: Identification>(
    rows: &[T],
    index: &PeptideProteinIndex,
    fasta: &Fasta,
    decoy: bool,
) -> Vec<ProteinAnnotation> {
    let assignment = assign_proteins(rows, index);
    let razor = get_shared_proteins(&assignment);
    let names = |ixs: &[ProteinIx]| {
        ixs.iter()
            .map(|&ix| protein_name(fasta, ix, decoy))
            .join(",")
    };

    rows.iter()
        .enumerate()
        .map(|(row, id)| {
            let candidates = lookup(index, id.sequence());
            let (assigned, is_razor) = match candidates {
                [_] => (candidates, false),
                _ => match razor.get(&row) {
                    Some(key) => (key.members(), true),
                    None => panic!("BUG: shared row {} was not resolved", row),
                },
            };
            ProteinAnnotation {
                protein: names(assigned),
                protein_group: names(candidates),
                razor: is_razor,
                protein_idx: assigned.iter().map(|ix| ix.0).collect(),
            }
        })
        .collect()
}

/// A row together with its protein annotation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Grouped<T> {
    #[serde(flatten)]
    pub row: T,
    #[serde(flatten)]
    pub annotation: ProteinAnnotation,
}

impl<T: Competitor> Competitor for Grouped<T> {
    fn score(&self) -> f32 {
        self.row.score()
    }

    fn decoy(&self) -> bool {
        self.row.decoy()
    }
}

/// Run protein grouping on the best row of every unique peptide, separately
/// for targets and decoys, then annotate every input row through its
/// (sequence, decoy) pair. Row order is preserved.
pub fn perform_protein_grouping<T: Identification>(
    rows: Vec<T>,
    index: &PeptideProteinIndex,
    fasta: &Fasta,
) -> Vec<Grouped<T>> {
    let start = Instant::now();

    // Best row per (sequence, decoy); the first row wins ties
    let mut best: BTreeMap<(&str, bool), usize> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        best.entry((row.sequence(), row.decoy()))
            .and_modify(|current| {
                if row.score() > rows[*current].score() {
                    *current = idx;
                }
            })
            .or_insert(idx);
    }

    let mut annotations: BTreeMap<(String, bool), ProteinAnnotation> = BTreeMap::new();
    for decoy in [false, true] {
        let unique = best
            .iter()
            .filter(|((_, d), _)| *d == decoy)
            .map(|(_, &idx)| &rows[idx])
            .collect::<Vec<&T>>();
        let groups = get_protein_groups(&unique, index, fasta, decoy);
        for (row, annotation) in unique.into_iter().zip(groups) {
            annotations.insert((row.sequence().to_string(), decoy), annotation);
        }
    }

    info!(
        "- assigned proteins to {} peptides in {}ms",
        annotations.len(),
        start.elapsed().as_millis()
    );

    rows.into_iter()
        .map(|row| {
            let key = (row.sequence().to_string(), row.decoy());
            let annotation = annotations[&key].clone();
            Grouped { row, annotation }
        })
        .collect()
}
