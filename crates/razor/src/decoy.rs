use serde::Serialize;

use crate::mass::Residue;
use crate::peptide::Peptide;

/// How decoy peptides are derived from target peptides
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecoyParameters {
    /// Keep the C-terminal residue in place and reverse the rest
    pub pseudo_reverse: bool,
    /// Swap every unmodified A/L with its right-hand neighbour
    pub al_swap: bool,
    /// Exchange a C-terminal K for R and vice versa
    pub kr_swap: bool,
}

impl Default for DecoyParameters {
    fn default() -> Self {
        DecoyParameters {
            pseudo_reverse: true,
            al_swap: false,
            kr_swap: false,
        }
    }
}

impl DecoyParameters {
    /// Generate the decoy counterpart of an (unmodified) target peptide.
    ///
    /// Residue tokens are reversed as a unit, so a tagged residue keeps its
    /// tag. Terminal tags stay attached to their terminus.
    pub fn reverse(&self, peptide: &Peptide) -> Peptide {
        let mut sequence = peptide.sequence.clone();
        let n = sequence.len();
        if self.pseudo_reverse && n > 1 {
            sequence[..n - 1].reverse();
        } else {
            sequence.reverse();
        }

        if self.al_swap {
            swap_al(&mut sequence);
        }
        if self.kr_swap {
            swap_kr(&mut sequence);
        }

        Peptide {
            decoy: true,
            sequence,
            nterm: peptide.nterm.clone(),
            cterm: peptide.cterm.clone(),
        }
    }
}

fn swap_al(sequence: &mut [Residue]) {
    let mut idx = 0;
    while idx + 1 < sequence.len() {
        match sequence[idx] {
            Residue::Just(b'A') | Residue::Just(b'L') => {
                sequence.swap(idx, idx + 1);
                idx += 2;
            }
            _ => idx += 1,
        }
    }
}

fn swap_kr(sequence: &mut [Residue]) {
    if let Some(last) = sequence.last_mut() {
        match last {
            Residue::Just(b'K') => *last = Residue::Just(b'R'),
            Residue::Just(b'R') => *last = Residue::Just(b'K'),
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decoy(params: DecoyParameters, s: &str) -> String {
        params.reverse(&Peptide::unmodified(s)).to_string()
    }

    #[test]
    fn pseudo_reverse() {
        let params = DecoyParameters::default();
        assert_eq!(decoy(params, "PEPTIDEK"), "EDITPEPK_decoy");
    }

    #[test]
    fn full_reverse() {
        let params = DecoyParameters {
            pseudo_reverse: false,
            ..Default::default()
        };
        assert_eq!(decoy(params, "PEPTIDEK"), "KEDITPEP_decoy");
    }

    #[test]
    fn swaps() {
        let params = DecoyParameters {
            pseudo_reverse: true,
            al_swap: true,
            kr_swap: true,
        };
        // pseudo reverse of GALAPEK is EPALAGK, then A/L swaps are
        // non-overlapping: EP(AL)(AG)K -> EPLAGAK, then K -> R
        assert_eq!(decoy(params, "GALAPEK"), "EPLAGAR_decoy");
    }

    #[test]
    fn tagged_residues_move_with_their_tag() {
        let params = DecoyParameters::default();
        let peptide: Peptide = "PEPoxMIDEK".parse().unwrap();
        assert_eq!(params.reverse(&peptide).to_string(), "EDIoxMPEPK_decoy");
    }
}
