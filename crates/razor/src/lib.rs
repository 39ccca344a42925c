pub mod database;
pub mod decoy;
pub mod enzyme;
pub mod fasta;
pub mod fdr;
pub mod ion_series;
pub mod mass;
pub mod modification;
pub mod peptide;
pub mod protein_grouping;
pub mod psm;
pub mod store;

use std::path::Path;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Configured path does not point at a regular file
    NotAFile(String),
    /// FASTA file contained no protein records
    EmptyFasta(String),
    /// No peptide survived digestion, modification and decoy generation
    EmptyLibrary,
    MissingParameter(&'static str),
    UnknownProtease(String),
    InvalidModification(String, modification::InvalidModification),
    UnknownModificationMass(String),
    InvalidSequence(String),
    InvalidFdrLevel(f32),
    ThreadPool(String),
    MissingArray(String),
    ArrayType {
        expected: &'static str,
        found: &'static str,
    },
    MalformedIndex(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::NotAFile(path) => write!(f, "`{}` is not a file", path),
            Self::EmptyFasta(path) => write!(f, "no protein records found in `{}`", path),
            Self::EmptyLibrary => f.write_str("no peptides generated: nothing to build a library from"),
            Self::MissingParameter(p) => write!(f, "`{}` must be set", p),
            Self::UnknownProtease(name) => write!(f, "unknown protease: {}", name),
            Self::InvalidModification(code, why) => {
                write!(f, "invalid modification `{}`: {}", code, why)
            }
            Self::UnknownModificationMass(tag) => {
                write!(f, "no mass configured for modification tag `{}`", tag)
            }
            Self::InvalidSequence(s) => write!(f, "invalid peptide sequence: {}", s),
            Self::InvalidFdrLevel(level) => {
                write!(f, "FDR level must be within (0, 1], got {}", level)
            }
            Self::ThreadPool(e) => write!(f, "failed to start worker pool: {}", e),
            Self::MissingArray(name) => write!(f, "array `{}` not found in store", name),
            Self::ArrayType { expected, found } => {
                write!(f, "expected array of {}, found {}", expected, found)
            }
            Self::MalformedIndex(why) => write!(f, "malformed index: {}", why),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

fn read_to_string<P: AsRef<Path>>(path: P) -> Result<String, Error> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::NotAFile(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Read and parse a FASTA file. Missing, non-file or empty inputs are
/// rejected before any digestion happens
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<fasta::Fasta, Error> {
    let contents = read_to_string(&path)?;
    let fasta = fasta::Fasta::parse(&contents);
    if fasta.is_empty() {
        return Err(Error::EmptyFasta(path.as_ref().display().to_string()));
    }
    Ok(fasta)
}

pub fn read_json<P, T>(path: P) -> Result<T, Error>
where
    P: AsRef<Path>,
    T: for<'de> serde::Deserialize<'de>,
{
    let contents = read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}
