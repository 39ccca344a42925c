use std::{
    collections::HashMap,
    fmt::{Display, Write},
    str::FromStr,
};

use serde::Serialize;

use crate::{mass::VALID_AA, Error};

/// Where a modification may be placed
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Site {
    /// Every occurrence of a residue, e.g. `cC`
    Residue(u8),
    /// N-terminus, optionally restricted to a residue: `a<^`, `a<M`
    Nterm(Option<u8>),
    /// C-terminus, optionally restricted to a residue: `am>^`, `am>G`
    Cterm(Option<u8>),
}

/// A modification code: a lowercase tag that is written in front of the
/// residue it modifies, plus the site it may be placed at
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModificationCode {
    pub tag: String,
    pub site: Site,
}

impl ModificationCode {
    pub fn is_nterm(&self) -> bool {
        matches!(self.site, Site::Nterm(_))
    }

    pub fn is_cterm(&self) -> bool {
        matches!(self.site, Site::Cterm(_))
    }
}

impl Display for ModificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tag)?;
        let residue = match self.site {
            Site::Residue(r) => Some(r),
            Site::Nterm(r) => {
                f.write_char('<')?;
                r
            }
            Site::Cterm(r) => {
                f.write_char('>')?;
                r
            }
        };
        match residue {
            Some(r) => f.write_char(r as char),
            None => f.write_char('^'),
        }
    }
}

impl Serialize for ModificationCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InvalidModification {
    Empty,
    InvalidResidue(char),
    InvalidTag(String),
    /// A residue modification was configured where a terminal one is required
    ExpectedTerminal,
    /// A terminal modification was configured where a residue one is required
    ExpectedResidue,
}

impl Display for InvalidModification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidModification::Empty => f.write_str("empty"),
            InvalidModification::InvalidResidue(c) => write!(f, "unrecognized residue ({})", c),
            InvalidModification::InvalidTag(t) => {
                write!(f, "tag `{}` must be one or more lowercase letters", t)
            }
            InvalidModification::ExpectedTerminal => {
                f.write_str("expected a terminal modification (`<` or `>`)")
            }
            InvalidModification::ExpectedResidue => {
                f.write_str("terminal modifications belong in a `_terminal` list")
            }
        }
    }
}

impl FromStr for ModificationCode {
    type Err = InvalidModification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(InvalidModification::InvalidTag(s.into()));
        }
        let (&last, rest) = s
            .as_bytes()
            .split_last()
            .ok_or(InvalidModification::Empty)?;

        let residue = match last {
            b'^' => None,
            r if VALID_AA.contains(&r) => Some(r),
            r => return Err(InvalidModification::InvalidResidue(r as char)),
        };

        let (site, tag) = match (rest.split_last(), residue) {
            (Some((b'<', tag)), r) => (Site::Nterm(r), tag),
            (Some((b'>', tag)), r) => (Site::Cterm(r), tag),
            (_, Some(r)) => (Site::Residue(r), rest),
            // `^` is only meaningful at a terminus
            (_, None) => return Err(InvalidModification::InvalidResidue('^')),
        };

        if tag.is_empty() || !tag.iter().all(u8::is_ascii_lowercase) {
            return Err(InvalidModification::InvalidTag(
                String::from_utf8_lossy(tag).into(),
            ));
        }

        Ok(ModificationCode {
            tag: String::from_utf8_lossy(tag).into(),
            site,
        })
    }
}

/// Parse a list of modification codes, preserving configuration order.
/// `terminal` selects whether the list must hold terminal or residue codes
pub fn validate_mods(
    input: Option<Vec<String>>,
    terminal: bool,
) -> Result<Vec<ModificationCode>, Error> {
    input
        .unwrap_or_default()
        .into_iter()
        .map(|s| {
            let code = s
                .parse::<ModificationCode>()
                .map_err(|e| Error::InvalidModification(s.clone(), e))?;
            match (terminal, code.site) {
                (true, Site::Residue(_)) => Err(Error::InvalidModification(
                    s,
                    InvalidModification::ExpectedTerminal,
                )),
                (false, Site::Nterm(_) | Site::Cterm(_)) => Err(Error::InvalidModification(
                    s,
                    InvalidModification::ExpectedResidue,
                )),
                _ => Ok(code),
            }
        })
        .collect()
}

/// Monoisotopic mass deltas for commonly used modification tags
pub fn default_masses() -> HashMap<String, f32> {
    [
        ("c", 57.021464),
        ("ox", 15.994915),
        ("a", 42.010565),
        ("p", 79.966331),
        ("deam", 0.984016),
        ("pg", -17.026549),
        ("am", -0.984016),
    ]
    .into_iter()
    .map(|(tag, mass)| (tag.to_string(), mass))
    .collect()
}
