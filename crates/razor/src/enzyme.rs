use fnv::FnvHashSet;
use regex::Regex;
use serde::Serialize;

use crate::mass::VALID_AA;
use crate::peptide::Peptide;
use crate::Error;

/// Cleavage rule for a named protease
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Protease {
    pub name: &'static str,
    /// Residues to cleave at. Empty for a non-specific digest, `$` for no
    /// cleavage at all
    pub cleave_at: &'static str,
    /// Skip a cleavage site if it is followed by this residue
    pub restrict: Option<char>,
    /// Cleave after (C-terminal to) the matched residue?
    pub c_terminal: bool,
}

const PROTEASES: [Protease; 10] = [
    Protease {
        name: "trypsin",
        cleave_at: "KR",
        restrict: Some('P'),
        c_terminal: true,
    },
    Protease {
        name: "trypsin_full",
        cleave_at: "KR",
        restrict: None,
        c_terminal: true,
    },
    Protease {
        name: "lys-c",
        cleave_at: "K",
        restrict: None,
        c_terminal: true,
    },
    Protease {
        name: "lys-n",
        cleave_at: "K",
        restrict: None,
        c_terminal: false,
    },
    Protease {
        name: "arg-c",
        cleave_at: "R",
        restrict: Some('P'),
        c_terminal: true,
    },
    Protease {
        name: "asp-n",
        cleave_at: "D",
        restrict: None,
        c_terminal: false,
    },
    Protease {
        name: "glu-c",
        cleave_at: "E",
        restrict: Some('P'),
        c_terminal: true,
    },
    Protease {
        name: "chymotrypsin",
        cleave_at: "FWYL",
        restrict: Some('P'),
        c_terminal: true,
    },
    Protease {
        name: "non-specific",
        cleave_at: "",
        restrict: None,
        c_terminal: true,
    },
    Protease {
        name: "no-cleavage",
        cleave_at: "$",
        restrict: None,
        c_terminal: true,
    },
];

impl Protease {
    /// Look up a protease by (case-insensitive) name
    pub fn by_name(name: &str) -> Result<Protease, Error> {
        PROTEASES
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| Error::UnknownProtease(name.into()))
    }
}

#[derive(Clone, Debug)]
pub struct EnzymeParameters {
    /// Number of missed cleavages to produce
    pub missed_cleavages: u8,
    /// Inclusive
    pub min_len: usize,
    /// Inclusive
    pub max_len: usize,
    pub enzyme: Option<Enzyme>,
}

#[derive(Clone, Debug)]
pub struct Enzyme {
    // Skip cleaving if the site is followed matching this AA
    pub skip_suffix: Option<char>,
    // Regex for matching cleavage sites
    regex: Regex,
    // Cleave at c-terminal?
    pub c_terminal: bool,
}

impl Enzyme {
    pub fn new(cleave: &str, skip_suffix: Option<char>, c_terminal: bool) -> Result<Option<Self>, Error> {
        let valid = |c: char| c.is_ascii() && VALID_AA.contains(&(c as u8));
        if !(cleave.chars().all(valid) || cleave == "$") {
            return Err(Error::UnknownProtease(format!(
                "cleavage sequence contains non-amino acid characters: {}",
                cleave
            )));
        }
        if let Some(skip) = skip_suffix.filter(|&c| !valid(c)) {
            return Err(Error::UnknownProtease(format!(
                "cleavage restriction is a non-amino acid character: {}",
                skip
            )));
        }

        let regex = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::UnknownProtease(e.to_string()))
        };

        // At this point, cleave can be three things: empty, "$", or a string of valid AA's
        match cleave {
            "" => Ok(None),
            "$" => Ok(Some(Enzyme {
                regex: regex("$")?,
                skip_suffix: None,
                // Allowing this to be set to false could cause unexpected behavior
                c_terminal: true,
            })),
            _ => Ok(Some(Enzyme {
                regex: regex(&format!("[{}]", cleave))?,
                skip_suffix,
                c_terminal,
            })),
        }
    }

    /// Partition `sequence` into base fragments at every cleavage site
    fn cleavage_sites(&self, sequence: &str) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut left = 0;
        for mat in self.regex.find_iter(sequence) {
            let right = match self.c_terminal {
                true => mat.end(),
                false => mat.start(),
            };
            if let Some(skip) = self.skip_suffix {
                if right < sequence.len() && sequence[right..].starts_with(skip) {
                    continue;
                }
            }
            if right > left {
                ranges.push(left..right);
                left = right;
            }
        }
        if left < sequence.len() {
            ranges.push(left..sequence.len());
        }
        ranges
    }
}

impl EnzymeParameters {
    pub fn new(
        protease: &Protease,
        missed_cleavages: u8,
        min_len: usize,
        max_len: usize,
    ) -> Result<Self, Error> {
        Ok(EnzymeParameters {
            missed_cleavages,
            min_len,
            max_len,
            enzyme: Enzyme::new(protease.cleave_at, protease.restrict, protease.c_terminal)?,
        })
    }

    fn cleavage_sites(&self, sequence: &str) -> Vec<std::ops::Range<usize>> {
        match &self.enzyme {
            Some(enzyme) => enzyme.cleavage_sites(sequence),
            None => {
                // Perform a non-specific digest
                let mut v = Vec::new();
                for len in self.min_len.max(1)..=self.max_len.min(sequence.len()) {
                    for i in 0..=sequence.len().saturating_sub(len) {
                        if i + len <= sequence.len() {
                            v.push(i..i + len)
                        }
                    }
                }
                v
            }
        }
    }

    /// Digest a protein into peptides.
    ///
    /// Cleavage sites are located on the bare residue letters and applied to
    /// the residue tokens, so protein-terminal modification tags stay attached
    /// to their residue. Base fragments are emitted first, followed by every
    /// concatenation of 2, 3, ... `missed_cleavages + 1` consecutive base
    /// fragments. Peptides outside of the length bounds and repeated
    /// peptides are dropped.
    pub fn digest(&self, protein: &Peptide) -> Vec<Peptide> {
        let residues = protein.residues();
        let mut digests = Vec::new();
        let sites = self.cleavage_sites(&residues);
        // Allowing missed_cleavages with non-specific digest causes OOB panics
        // in the below indexing code
        let missed_cleavages = match self.enzyme {
            None => 0,
            _ => self.missed_cleavages,
        };

        // Keep a set of peptides that have been digested from this sequence
        // - handles cases where the same peptide occurs multiple times in a protein
        let mut seen = FnvHashSet::default();

        for cleavage in 1..=(1 + missed_cleavages as usize) {
            // Generate missed cleavages
            for win in sites.windows(cleavage) {
                let start = win[0].start;
                let end = win[cleavage - 1].end;
                let len = end - start;

                if len >= self.min_len && len <= self.max_len && len > 0 {
                    let peptide = protein.slice(start..end);
                    if seen.insert(peptide.clone()) {
                        digests.push(peptide);
                    }
                }
            }
        }
        digests
    }
}
