//! False discovery rate control by target-decoy competition.
//!
//! Rows are ranked by descending score; at every rank the ratio of decoys to
//! targets seen so far estimates the FDR, and the q-value of a row is the
//! smallest FDR at or below its rank. Cutoffs can be computed directly on PSMs
//! ([`cut_fdr`]) or on any aggregate analyte such as peptide sequence or
//! protein group ([`cut_global_fdr`]).

use std::collections::{BTreeMap, BTreeSet};

use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};

use crate::psm::Psm;
use crate::Error;

/// Anything that can take part in target-decoy competition
pub trait Competitor {
    fn score(&self) -> f32;
    fn decoy(&self) -> bool;
}

impl<T: Competitor + ?Sized> Competitor for &T {
    fn score(&self) -> f32 {
        (**self).score()
    }

    fn decoy(&self) -> bool {
        (**self).decoy()
    }
}

/// A row annotated with its target-decoy statistics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ranked<T> {
    #[serde(flatten)]
    pub row: T,
    pub target_cum: u32,
    pub decoy_cum: u32,
    pub fdr: f32,
    pub q_value: f32,
}

impl<T: Competitor> Competitor for Ranked<T> {
    fn score(&self) -> f32 {
        self.row.score()
    }

    fn decoy(&self) -> bool {
        self.row.decoy()
    }
}

/// Rank rows by descending score and compute FDR and q-values.
///
/// Ties in score place targets before decoys; otherwise the input order is
/// kept, so the ranking is reproducible. While no target has been seen the
/// FDR is infinite. Rows with a NaN score cannot be ranked and are dropped.
pub fn q_values<T: Competitor>(mut rows: Vec<T>) -> Vec<Ranked<T>> {
    let n_rows = rows.len();
    rows.retain(|row| !row.score().is_nan());
    if rows.len() < n_rows {
        log::warn!("dropped {} rows with a NaN score", n_rows - rows.len());
    }

    rows.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then_with(|| a.decoy().cmp(&b.decoy()))
    });

    let mut target_cum = 0;
    let mut decoy_cum = 0;
    let mut ranked = rows
        .into_iter()
        .map(|row| {
            match row.decoy() {
                true => decoy_cum += 1,
                false => target_cum += 1,
            }
            let fdr = match target_cum {
                0 => f32::INFINITY,
                _ => decoy_cum as f32 / target_cum as f32,
            };
            Ranked {
                row,
                target_cum,
                decoy_cum,
                fdr,
                q_value: fdr,
            }
        })
        .collect::<Vec<_>>();

    // Q-value is the minimum FDR at any given score threshold
    let mut q_min = f32::INFINITY;
    for rank in ranked.iter_mut().rev() {
        q_min = q_min.min(rank.fdr);
        rank.q_value = q_min;
    }
    ranked
}

/// Keep the rows scoring at least as well as the last row whose q-value is
/// within `fdr_level`. Returns rows in rank order.
pub fn cut_fdr<T: Competitor>(rows: Vec<T>, fdr_level: f32) -> Vec<Ranked<T>> {
    let ranked = q_values(rows);
    match ranked.iter().rposition(|r| r.q_value <= fdr_level) {
        None => {
            log::trace!("no row within {} FDR", fdr_level);
            Vec::new()
        }
        Some(idx) if idx + 1 == ranked.len() => ranked,
        Some(idx) => {
            let cutoff = ranked[idx].score();
            ranked
                .into_iter()
                .take_while(|r| r.score() >= cutoff)
                .collect()
        }
    }
}

/// Best score observed for one (analyte, decoy) pair
struct Analyte<K> {
    key: K,
    decoy: bool,
    score: f32,
}

impl<K> Competitor for Analyte<K> {
    fn score(&self) -> f32 {
        self.score
    }

    fn decoy(&self) -> bool {
        self.decoy
    }
}

/// FDR control at the level of an aggregate analyte.
///
/// Rows are collapsed to one entry per (analyte key, decoy) pair carrying the
/// best score, the collapsed table is cut with [`cut_fdr`], and every row of
/// a surviving pair is returned in its original order.
pub fn cut_global_fdr<T, K, F>(rows: Vec<T>, analyte: F, fdr_level: f32) -> Vec<T>
where
    T: Competitor,
    K: Ord + Clone,
    F: Fn(&T) -> K,
{
    let mut best: BTreeMap<(K, bool), f32> = BTreeMap::new();
    for row in &rows {
        best.entry((analyte(row), row.decoy()))
            .and_modify(|score| *score = score.max(row.score()))
            .or_insert_with(|| row.score());
    }

    let analytes = best
        .into_iter()
        .map(|((key, decoy), score)| Analyte { key, decoy, score })
        .collect::<Vec<_>>();
    let n_analytes = analytes.len();

    let passing = cut_fdr(analytes, fdr_level)
        .into_iter()
        .map(|r| (r.row.key, r.row.decoy))
        .collect::<BTreeSet<_>>();
    log::trace!(
        "{} of {} analytes pass {} FDR",
        passing.len(),
        n_analytes,
        fdr_level
    );

    rows.into_iter()
        .filter(|row| passing.contains(&(analyte(row), row.decoy())))
        .collect()
}

/// How many rank-1 matches to keep per query
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Exactly one match per query; ties prefer targets, then the
    /// lexicographically smallest sequence
    #[default]
    Single,
    /// Every top-scoring match per query, one row per sequence
    Multiple,
}

/// Keep only the top-scoring match(es) of each query. Output preserves input
/// order.
pub fn filter_score(rows: Vec<Psm>, mode: FilterMode) -> Vec<Psm> {
    let mut best: FnvHashMap<u32, f32> = FnvHashMap::default();
    for row in &rows {
        best.entry(row.query_id)
            .and_modify(|score| *score = score.max(row.score))
            .or_insert(row.score);
    }
    let is_top = |row: &Psm| best[&row.query_id] == row.score;

    // For single mode: the winning (decoy, sequence) of every query
    let mut chosen: FnvHashMap<u32, (bool, String)> = FnvHashMap::default();
    if mode == FilterMode::Single {
        for row in rows.iter().filter(|&row| is_top(row)) {
            let candidate = (row.decoy, row.sequence.clone());
            chosen
                .entry(row.query_id)
                .and_modify(|current| {
                    if candidate < *current {
                        *current = candidate.clone();
                    }
                })
                .or_insert_with(|| candidate.clone());
        }
    }

    let mut seen = FnvHashSet::default();
    rows.into_iter()
        .filter(|row| {
            if !is_top(row) {
                return false;
            }
            if let Some((decoy, sequence)) = chosen.get(&row.query_id) {
                if *decoy != row.decoy || *sequence != row.sequence {
                    return false;
                }
            }
            seen.insert((row.query_id, row.decoy, row.sequence.clone()))
        })
        .collect()
}

/// Keep only the best-scoring match of each precursor. Rows that are not
/// linked to a precursor pass through; among equal scores the first row wins.
/// Output preserves input order.
pub fn filter_precursor(rows: Vec<Psm>) -> Vec<Psm> {
    let mut best: FnvHashMap<u32, (f32, usize)> = FnvHashMap::default();
    for (idx, row) in rows.iter().enumerate() {
        if let Some(precursor) = row.precursor_id {
            let entry = best.entry(precursor).or_insert((row.score, idx));
            if row.score > entry.0 {
                *entry = (row.score, idx);
            }
        }
    }

    rows.into_iter()
        .enumerate()
        .filter(|(idx, row)| match row.precursor_id {
            Some(precursor) => best[&precursor].1 == *idx,
            None => true,
        })
        .map(|(_, row)| row)
        .collect()
}

fn validate_level(name: &'static str, level: Option<f32>) -> Result<f32, Error> {
    let level = level.unwrap_or(0.01);
    match level > 0.0 && level <= 1.0 {
        true => Ok(level),
        false => {
            log::error!("{} must be within (0, 1]", name);
            Err(Error::InvalidFdrLevel(level))
        }
    }
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct FdrBuilder {
    pub peptide_fdr: Option<f32>,
    pub protein_fdr: Option<f32>,
    pub filter_mode: Option<FilterMode>,
}

impl FdrBuilder {
    pub fn make_parameters(self) -> Result<FdrSettings, Error> {
        Ok(FdrSettings {
            peptide_fdr: validate_level("peptide_fdr", self.peptide_fdr)?,
            protein_fdr: validate_level("protein_fdr", self.protein_fdr)?,
            filter_mode: self.filter_mode.unwrap_or_default(),
        })
    }
}

#[derive(Serialize, Copy, Clone, Debug, PartialEq)]
pub struct FdrSettings {
    pub peptide_fdr: f32,
    pub protein_fdr: f32,
    pub filter_mode: FilterMode,
}
