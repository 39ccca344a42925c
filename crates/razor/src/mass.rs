use std::fmt::Write;

use serde::Serialize;

pub const H2O: f32 = 18.010565;
pub const PROTON: f32 = 1.0072764;

pub trait Mass {
    fn monoisotopic(&self) -> f32;
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Residue {
    // Standard amino acid residue
    Just(u8),
    // Amino acid residue carrying a modification tag, e.g. `oxM`
    Mod(u8, String),
}

impl Residue {
    pub fn residue(&self) -> u8 {
        match self {
            Residue::Just(c) | Residue::Mod(c, _) => *c,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Residue::Just(_) => None,
            Residue::Mod(_, tag) => Some(tag),
        }
    }

    pub fn is_valid(&self) -> bool {
        VALID_AA.contains(&self.residue())
    }
}

pub const VALID_AA: [u8; 22] = [
    b'A', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'K', b'L', b'M', b'N', b'P', b'Q', b'R', b'S',
    b'T', b'V', b'W', b'Y', b'U', b'O',
];

impl Mass for u8 {
    fn monoisotopic(&self) -> f32 {
        match self {
            b'A' => 71.03711,
            b'R' => 156.1011,
            b'N' => 114.04293,
            b'D' => 115.02694,
            b'C' => 103.00919,
            b'E' => 129.04259,
            b'Q' => 128.05858,
            b'G' => 57.02146,
            b'H' => 137.05891,
            b'I' => 113.08406,
            b'L' => 113.08406,
            b'K' => 128.09496,
            b'M' => 131.0405,
            b'F' => 147.0684,
            b'P' => 97.05276,
            b'S' => 87.03203,
            b'T' => 101.04768,
            b'W' => 186.07931,
            b'Y' => 163.06333,
            b'V' => 99.06841,
            b'U' => 150.95363,
            b'O' => 237.14773,
            _ => unreachable!("BUG: invalid amino acid {}", *self as char),
        }
    }
}

impl std::fmt::Display for Residue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Residue::Just(c) => f.write_char(*c as char),
            Residue::Mod(c, tag) => {
                f.write_str(tag)?;
                f.write_char(*c as char)
            }
        }
    }
}
