use fnv::FnvHashSet;
use std::fmt::Write;
use std::str::FromStr;

use crate::{
    mass::{Residue, VALID_AA},
    modification::{ModificationCode, Site},
    Error,
};

/// Suffix distinguishing decoy peptide strings from target peptide strings
pub const DECOY_TAG: &str = "_decoy";

/// A candidate peptide: a sequence of residue tokens, optional terminal
/// modification tags and a decoy flag.
///
/// The string form concatenates `tag + residue` for every token, so
/// `PEPoxMIDE` is `PEP` + oxidised `M` + `IDE`. Terminal tags are written in
/// front of the first residue (N-term) or directly before the last residue
/// letter (C-term). Decoys carry the [`DECOY_TAG`] suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peptide {
    pub decoy: bool,
    pub sequence: Vec<Residue>,
    pub nterm: Option<String>,
    pub cterm: Option<String>,
}

impl Peptide {
    /// Wrap a bare amino acid sequence without validating its alphabet
    pub fn unmodified(sequence: &str) -> Self {
        Peptide {
            sequence: sequence.bytes().map(Residue::Just).collect(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Bare residue letters, without modification tags
    pub fn residues(&self) -> String {
        self.sequence.iter().map(|r| r.residue() as char).collect()
    }

    /// Does every residue belong to the valid amino acid alphabet?
    pub fn is_valid(&self) -> bool {
        !self.sequence.is_empty() && self.sequence.iter().all(Residue::is_valid)
    }

    /// Copy out the residues in `range`, keeping terminal tags only if the
    /// slice touches the corresponding terminus
    pub fn slice(&self, range: std::ops::Range<usize>) -> Peptide {
        Peptide {
            decoy: self.decoy,
            nterm: match range.start {
                0 => self.nterm.clone(),
                _ => None,
            },
            cterm: match range.end == self.sequence.len() {
                true => self.cterm.clone(),
                false => None,
            },
            sequence: self.sequence[range].to_vec(),
        }
    }

    /// Apply a fixed residue modification in-place. The first modification
    /// configured for a residue wins; modified residues are never overwritten
    pub fn static_mod(&mut self, code: &ModificationCode) {
        let target = match code.site {
            Site::Residue(r) => r,
            _ => return,
        };
        for resi in self.sequence.iter_mut() {
            match resi {
                Residue::Just(c) if *c == target => {
                    *resi = Residue::Mod(target, code.tag.clone());
                }
                _ => {}
            }
        }
    }

    /// Return a copy of this peptide carrying the terminal modification,
    /// or `None` if it cannot be placed (wrong residue, terminus already
    /// modified, or not a terminal modification)
    pub fn terminal_mod(&self, code: &ModificationCode) -> Option<Peptide> {
        let fits = |resi: Option<&Residue>, restrict: Option<u8>| match (resi, restrict) {
            (Some(_), None) => true,
            (Some(Residue::Just(c)), Some(r)) => *c == r,
            (Some(Residue::Mod(..)), Some(_)) => false,
            (None, _) => false,
        };
        match code.site {
            Site::Nterm(r) if self.nterm.is_none() && fits(self.sequence.first(), r) => {
                let mut modified = self.clone();
                modified.nterm = Some(code.tag.clone());
                Some(modified)
            }
            Site::Cterm(r) if self.cterm.is_none() && fits(self.sequence.last(), r) => {
                let mut modified = self.clone();
                modified.cterm = Some(code.tag.clone());
                Some(modified)
            }
            _ => None,
        }
    }

    /// Enumerate variable residue modification isoforms with an explicit
    /// breadth-first worklist.
    ///
    /// Each step places one more modification on an unmodified residue at
    /// or after the position of the previous step, so every combination is
    /// reached exactly once. Expansion stops after `n_modifications_max`
    /// steps or once `isoforms_max` isoforms exist. The unmodified peptide
    /// is always the first isoform, and no two isoforms are equal.
    pub fn isoforms(
        &self,
        mods: &[ModificationCode],
        isoforms_max: usize,
        n_modifications_max: usize,
    ) -> Vec<Peptide> {
        let isoforms_max = isoforms_max.max(1);
        let mut isoforms = vec![self.clone()];
        let mut seen = FnvHashSet::default();
        seen.insert(self.clone());

        let mut worklist = vec![(self.clone(), 0usize)];
        let mut steps = 0;
        while isoforms.len() < isoforms_max && steps < n_modifications_max && !worklist.is_empty()
        {
            let mut next = Vec::new();
            'expand: for (peptide, min_idx) in &worklist {
                for (idx, resi) in peptide.sequence.iter().enumerate().skip(*min_idx) {
                    let r = match resi {
                        Residue::Just(r) => *r,
                        Residue::Mod(..) => continue,
                    };
                    for code in mods.iter().filter(|m| m.site == Site::Residue(r)) {
                        let mut modified = peptide.clone();
                        modified.sequence[idx] = Residue::Mod(r, code.tag.clone());
                        if seen.insert(modified.clone()) {
                            isoforms.push(modified.clone());
                            next.push((modified, idx + 1));
                            if isoforms.len() >= isoforms_max {
                                break 'expand;
                            }
                        }
                    }
                }
            }
            worklist = next;
            steps += 1;
        }
        isoforms
    }
}

/// Expand a set of peptides with variable terminal modifications: N-terminal
/// codes first, then C-terminal codes over the N-terminal result. Output is
/// deduplicated, preserving first occurrence order
pub fn terminal_isoforms(peptides: Vec<Peptide>, mods: &[ModificationCode]) -> Vec<Peptide> {
    if mods.is_empty() {
        return peptides;
    }

    let mut nterm = peptides.clone();
    for code in mods.iter().filter(|m| m.is_nterm()) {
        nterm.extend(peptides.iter().filter_map(|p| p.terminal_mod(code)));
    }
    let nterm = unique(nterm);

    let mut cterm = nterm.clone();
    for code in mods.iter().filter(|m| m.is_cterm()) {
        cterm.extend(nterm.iter().filter_map(|p| p.terminal_mod(code)));
    }
    unique(cterm)
}

fn unique(peptides: Vec<Peptide>) -> Vec<Peptide> {
    let mut seen = FnvHashSet::default();
    peptides
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = self.sequence.len().saturating_sub(1);
        for (idx, resi) in self.sequence.iter().enumerate() {
            if idx == 0 {
                if let Some(tag) = &self.nterm {
                    f.write_str(tag)?;
                }
            }
            if idx == last {
                if let Some(tag) = &self.cterm {
                    f.write_str(tag)?;
                }
            }
            if let Some(tag) = resi.tag() {
                f.write_str(tag)?;
            }
            f.write_char(resi.residue() as char)?;
        }
        if self.decoy {
            f.write_str(DECOY_TAG)?;
        }
        Ok(())
    }
}

impl FromStr for Peptide {
    type Err = Error;

    /// Parse a peptide string into residue tokens. Every lowercase run is
    /// read as a residue tag of the following letter
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (body, decoy) = match s.strip_suffix(DECOY_TAG) {
            Some(body) => (body, true),
            None => (s, false),
        };

        let mut sequence = Vec::with_capacity(body.len());
        let mut tag = String::new();
        for ch in body.chars() {
            if ch.is_ascii_lowercase() {
                tag.push(ch);
            } else if ch.is_ascii() && VALID_AA.contains(&(ch as u8)) {
                match tag.is_empty() {
                    true => sequence.push(Residue::Just(ch as u8)),
                    false => sequence.push(Residue::Mod(ch as u8, std::mem::take(&mut tag))),
                }
            } else {
                return Err(Error::InvalidSequence(s.into()));
            }
        }
        if !tag.is_empty() || sequence.is_empty() {
            return Err(Error::InvalidSequence(s.into()));
        }

        Ok(Peptide {
            decoy,
            sequence,
            nterm: None,
            cterm: None,
        })
    }
}
