use serde::{Deserialize, Serialize};

use crate::fdr::Competitor;
use crate::protein_grouping::Identification;

/// A scored peptide-spectrum match, as produced by an external search engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Psm {
    pub query_id: u32,
    /// Candidate peptide string, as stored in the library index
    pub sequence: String,
    pub score: f32,
    pub decoy: bool,
    #[serde(default)]
    pub feature_id: Option<u32>,
    #[serde(default)]
    pub precursor_id: Option<u32>,
}

impl Competitor for Psm {
    fn score(&self) -> f32 {
        self.score
    }

    fn decoy(&self) -> bool {
        self.decoy
    }
}

impl Identification for Psm {
    fn sequence(&self) -> &str {
        &self.sequence
    }
}
