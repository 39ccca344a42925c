use std::collections::HashMap;
use std::ops::Range;
use std::sync::Mutex;
use std::time::Instant;

use fnv::{FnvHashMap, FnvHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::decoy::DecoyParameters;
use crate::enzyme::{EnzymeParameters, Protease};
use crate::fasta::Fasta;
use crate::ion_series::{Fragmenter, IonFragmenter, Kind, TheoreticalSpectrum};
use crate::modification::{default_masses, validate_mods, ModificationCode};
use crate::peptide::{terminal_isoforms, Peptide};
use crate::store::ArrayStore;
use crate::Error;

#[derive(Deserialize, Default, Debug, Clone)]
/// Parameters used for generating the peptide library
pub struct Builder {
    /// Protease name, see [`Protease::by_name`]
    pub protease: Option<String>,
    /// Fixed residue modifications, e.g. `cC`
    pub mods_fixed: Option<Vec<String>>,
    /// Fixed peptide-terminal modifications
    pub mods_fixed_terminal: Option<Vec<String>>,
    /// Fixed protein-terminal modifications
    pub mods_fixed_terminal_prot: Option<Vec<String>>,
    /// Variable residue modifications, e.g. `oxM`
    pub mods_variable: Option<Vec<String>>,
    /// Variable peptide-terminal modifications
    pub mods_variable_terminal: Option<Vec<String>>,
    /// Variable protein-terminal modifications, e.g. `a<^`
    pub mods_variable_terminal_prot: Option<Vec<String>>,
    /// Modification tag masses, added to (or overriding) the built-in table
    pub mods_mass: Option<HashMap<String, f32>>,
    /// Maximum number of isoforms generated per peptide
    pub isoforms_max: Option<usize>,
    /// Maximum number of variable residue modifications per peptide
    pub n_modifications_max: Option<usize>,
    pub pep_length_min: Option<usize>,
    pub pep_length_max: Option<usize>,
    pub n_missed_cleavages: Option<u8>,

    pub pseudo_reverse: Option<bool>,
    #[serde(rename = "AL_swap")]
    pub al_swap: Option<bool>,
    #[serde(rename = "KR_swap")]
    pub kr_swap: Option<bool>,

    /// Number of proteins digested per work unit
    pub fasta_block: Option<usize>,
    /// Number of spectra flattened per work unit when persisting
    pub spectra_block: Option<usize>,
    /// Worker threads; 0 lets the thread pool decide
    pub n_processes: Option<usize>,
    /// Which kind of fragment ions to generate (a, b, c, x, y, z)
    pub ion_kinds: Option<Vec<Kind>>,
    /// Path to fasta database
    pub fasta: Option<String>,
}

impl Builder {
    pub fn make_parameters(self) -> Result<Parameters, Error> {
        let protease = Protease::by_name(self.protease.as_deref().unwrap_or("trypsin"))?;
        let pep_length_min = self.pep_length_min.unwrap_or(7);
        let pep_length_max = self.pep_length_max.unwrap_or(27);
        if pep_length_min > pep_length_max {
            log::warn!(
                "pep_length_min ({}) exceeds pep_length_max ({}): no peptides will pass",
                pep_length_min,
                pep_length_max
            );
        }
        let enzyme = EnzymeParameters::new(
            &protease,
            self.n_missed_cleavages.unwrap_or(2),
            pep_length_min,
            pep_length_max,
        )?;

        let default_fixed = Some(vec!["cC".to_string()]);
        let default_variable = Some(vec!["oxM".to_string()]);
        let default_prot = Some(vec!["a<^".to_string()]);

        let mods_fixed = validate_mods(self.mods_fixed.or(default_fixed), false)?;
        let mods_fixed_terminal = validate_mods(self.mods_fixed_terminal, true)?;
        let mods_fixed_terminal_prot = validate_mods(self.mods_fixed_terminal_prot, true)?;
        let mods_variable = validate_mods(self.mods_variable.or(default_variable), false)?;
        let mods_variable_terminal = validate_mods(self.mods_variable_terminal, true)?;
        let mods_variable_terminal_prot =
            validate_mods(self.mods_variable_terminal_prot.or(default_prot), true)?;

        let mut mods_mass = default_masses();
        mods_mass.extend(self.mods_mass.unwrap_or_default());

        // Every tag that can end up on a peptide needs a mass
        for code in mods_fixed
            .iter()
            .chain(&mods_fixed_terminal)
            .chain(&mods_fixed_terminal_prot)
            .chain(&mods_variable)
            .chain(&mods_variable_terminal)
            .chain(&mods_variable_terminal_prot)
        {
            if !mods_mass.contains_key(&code.tag) {
                return Err(Error::UnknownModificationMass(code.tag.clone()));
            }
        }

        let isoforms_max = match self.isoforms_max {
            Some(0) => {
                log::warn!("isoforms_max must be at least 1, using 1");
                1
            }
            Some(x) => x,
            None => 1024,
        };

        Ok(Parameters {
            protease,
            enzyme,
            mods_fixed,
            mods_fixed_terminal,
            mods_fixed_terminal_prot,
            mods_variable,
            mods_variable_terminal,
            mods_variable_terminal_prot,
            mods_mass,
            isoforms_max,
            n_modifications_max: self.n_modifications_max.unwrap_or(3),
            decoy: DecoyParameters {
                pseudo_reverse: self.pseudo_reverse.unwrap_or(true),
                al_swap: self.al_swap.unwrap_or(false),
                kr_swap: self.kr_swap.unwrap_or(false),
            },
            fasta_block: self.fasta_block.unwrap_or(1000).max(1),
            spectra_block: self.spectra_block.unwrap_or(100_000).max(1),
            n_processes: self.n_processes.unwrap_or(0),
            ion_kinds: self.ion_kinds.unwrap_or_else(|| vec![Kind::B, Kind::Y]),
            fasta: self.fasta.ok_or(Error::MissingParameter("fasta"))?,
        })
    }

    pub fn update_fasta(&mut self, fasta: String) {
        self.fasta = Some(fasta)
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct Parameters {
    pub protease: Protease,
    #[serde(skip)]
    pub enzyme: EnzymeParameters,
    pub mods_fixed: Vec<ModificationCode>,
    pub mods_fixed_terminal: Vec<ModificationCode>,
    pub mods_fixed_terminal_prot: Vec<ModificationCode>,
    pub mods_variable: Vec<ModificationCode>,
    pub mods_variable_terminal: Vec<ModificationCode>,
    pub mods_variable_terminal_prot: Vec<ModificationCode>,
    pub mods_mass: HashMap<String, f32>,
    pub isoforms_max: usize,
    pub n_modifications_max: usize,
    pub decoy: DecoyParameters,
    pub fasta_block: usize,
    pub spectra_block: usize,
    pub n_processes: usize,
    pub ion_kinds: Vec<Kind>,
    pub fasta: String,
}

/// The result of digesting one contiguous block of proteins
#[derive(Default)]
struct Shard {
    spectra: Vec<TheoreticalSpectrum>,
    index: PeptideProteinIndex,
}

impl Parameters {
    /// Peptide-level modification pipeline, shared by targets and decoys:
    /// fixed residue mods, fixed terminal mods, variable terminal mods and
    /// finally variable residue mods
    fn modify(&self, mut peptide: Peptide) -> Vec<Peptide> {
        for code in &self.mods_fixed {
            peptide.static_mod(code);
        }
        for code in &self.mods_fixed_terminal {
            if let Some(modified) = peptide.terminal_mod(code) {
                peptide = modified;
            }
        }

        let terminal = terminal_isoforms(vec![peptide], &self.mods_variable_terminal);
        let budget = self.isoforms_max.saturating_sub(terminal.len()).max(1);

        let mut isoforms = Vec::new();
        for peptide in terminal {
            let remaining = self.isoforms_max - isoforms.len();
            isoforms.extend(
                peptide
                    .isoforms(&self.mods_variable, budget, self.n_modifications_max)
                    .into_iter()
                    .take(remaining),
            );
            if isoforms.len() >= self.isoforms_max {
                break;
            }
        }
        isoforms
    }

    /// Expand a single protein sequence into target and decoy peptides.
    /// Each peptide is returned at most once, targets of a cleavage product
    /// before its decoys
    pub fn generate_peptides(&self, sequence: &str) -> Vec<Peptide> {
        let mut protein = Peptide::unmodified(sequence);
        for code in &self.mods_fixed_terminal_prot {
            if let Some(modified) = protein.terminal_mod(code) {
                protein = modified;
            }
        }

        let mut seen = FnvHashSet::default();
        let mut peptides = Vec::new();
        for protein in terminal_isoforms(vec![protein], &self.mods_variable_terminal_prot) {
            for peptide in self.enzyme.digest(&protein) {
                if !peptide.is_valid() {
                    log::trace!("skipping {}: invalid residues", peptide);
                    continue;
                }
                let decoy = self.decoy.reverse(&peptide);
                for candidate in self
                    .modify(peptide)
                    .into_iter()
                    .chain(self.modify(decoy))
                {
                    if seen.insert(candidate.clone()) {
                        peptides.push(candidate);
                    }
                }
            }
        }
        peptides
    }

    fn digest_block<F: Fragmenter>(
        &self,
        fasta: &Fasta,
        block: Range<usize>,
        fragmenter: &F,
    ) -> Result<Shard, Error> {
        let mut shard = Shard::default();
        for ix in block {
            let protein = ProteinIx(ix as u32);
            for peptide in self.generate_peptides(&fasta[protein].sequence) {
                if shard.index.insert(peptide.to_string(), protein) {
                    shard.spectra.push(fragmenter.fragment(&peptide)?);
                }
            }
        }
        Ok(shard)
    }

    pub fn build(&self, fasta: &Fasta) -> Result<IndexedDatabase, Error> {
        self.build_with_progress(fasta, |_| {})
    }

    pub fn build_with_progress<P>(&self, fasta: &Fasta, progress: P) -> Result<IndexedDatabase, Error>
    where
        P: Fn(f32) + Sync,
    {
        let fragmenter = IonFragmenter {
            ion_kinds: self.ion_kinds.clone(),
            mods_mass: self.mods_mass.clone(),
        };
        self.build_with(fasta, &fragmenter, progress)
    }

    /// Digest every protein in `fasta` and build the peptide library.
    ///
    /// Proteins are split into contiguous blocks of `fasta_block` and each
    /// block is digested independently on a pool of `n_processes` threads.
    /// Partial indices are unioned afterwards, and theoretical spectra are
    /// sorted by peptide so that duplicates from different blocks become
    /// neighbours and can be dropped. Any error aborts the whole build.
    /// `progress` receives the fraction of proteins digested so far, in
    /// increasing order.
    pub fn build_with<F, P>(
        &self,
        fasta: &Fasta,
        fragmenter: &F,
        progress: P,
    ) -> Result<IndexedDatabase, Error>
    where
        F: Fragmenter + Sync,
        P: Fn(f32) + Sync,
    {
        if fasta.is_empty() {
            return Err(Error::EmptyFasta(self.fasta.clone()));
        }
        let start = Instant::now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_processes)
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let total = fasta.len();
        let blocks = (0..total)
            .step_by(self.fasta_block)
            .map(|lo| lo..(lo + self.fasta_block).min(total))
            .collect::<Vec<_>>();
        log::trace!(
            "digesting {} proteins in {} blocks on {} threads",
            total,
            blocks.len(),
            pool.current_num_threads()
        );

        let done = Mutex::new(0usize);
        let shards = pool.install(|| {
            blocks
                .par_iter()
                .map(|block| {
                    let shard = self.digest_block(fasta, block.clone(), fragmenter)?;
                    // Hold the lock while reporting, so reports never go backwards
                    let mut done = done.lock().unwrap_or_else(|e| e.into_inner());
                    *done += block.len();
                    progress(*done as f32 / total as f32);
                    Ok(shard)
                })
                .collect::<Result<Vec<Shard>, Error>>()
        })?;

        log::trace!("merging {} shards", shards.len());
        let mut index = PeptideProteinIndex::default();
        let mut spectra = Vec::new();
        for shard in shards {
            index.merge(shard.index);
            spectra.extend(shard.spectra);
        }

        if index.is_empty() {
            return Err(Error::EmptyLibrary);
        }

        spectra.par_sort_unstable_by(|a, b| a.peptide.cmp(&b.peptide));
        spectra.dedup_by(|remove, keep| remove.peptide == keep.peptide);

        log::info!(
            "generated {} unique peptides from {} proteins in {}ms",
            index.len(),
            total,
            start.elapsed().as_millis()
        );

        Ok(IndexedDatabase {
            spectra: SpectraTable::from_spectra(&spectra, self.spectra_block),
            index,
        })
    }
}

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ProteinIx(pub u32);

/// Peptide string -> ascending, duplicate-free list of proteins it was
/// digested from
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeptideProteinIndex {
    inner: FnvHashMap<String, Vec<ProteinIx>>,
}

impl PeptideProteinIndex {
    /// Record that `peptide` occurs in `protein`. Returns true if the peptide
    /// was not present in the index before
    pub fn insert(&mut self, peptide: String, protein: ProteinIx) -> bool {
        let mut new = false;
        let proteins = self.inner.entry(peptide).or_insert_with(|| {
            new = true;
            Vec::new()
        });
        if let Err(pos) = proteins.binary_search(&protein) {
            proteins.insert(pos, protein);
        }
        new
    }

    /// Union another index into this one
    pub fn merge(&mut self, other: PeptideProteinIndex) {
        for (peptide, proteins) in other.inner {
            for protein in proteins {
                self.insert(peptide.clone(), protein);
            }
        }
    }

    pub fn get(&self, peptide: &str) -> Option<&[ProteinIx]> {
        self.inner.get(peptide).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ProteinIx])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Check that every referenced protein exists in a collection of
    /// `n_proteins` records
    pub fn validate(&self, n_proteins: usize) -> Result<(), Error> {
        for (peptide, proteins) in self.iter() {
            if let Some(ix) = proteins.iter().find(|ix| ix.0 as usize >= n_proteins) {
                return Err(Error::MalformedIndex(format!(
                    "{} refers to protein {}, but only {} proteins exist",
                    peptide, ix.0, n_proteins
                )));
            }
        }
        Ok(())
    }

    /// Persist as sorted peptides plus a CSR layout of protein indices
    pub fn save<S: ArrayStore>(&self, store: &mut S) {
        let mut peptides = self.inner.keys().cloned().collect::<Vec<_>>();
        peptides.sort_unstable();

        let mut indptr = Vec::with_capacity(peptides.len() + 1);
        let mut indices = Vec::new();
        indptr.push(0u64);
        for peptide in &peptides {
            indices.extend(self.inner[peptide].iter().map(|ix| ix.0));
            indptr.push(indices.len() as u64);
        }

        store.put("peptides", peptides.into());
        store.put("peptide_indptr", indptr.into());
        store.put("protein_indices", indices.into());
    }

    pub fn load<S: ArrayStore>(store: &S) -> Result<Self, Error> {
        let peptides = store.get_as::<String>("peptides")?;
        let indptr = store.get_as::<u64>("peptide_indptr")?;
        let indices = store.get_as::<u32>("protein_indices")?;
        let ranges = csr_ranges(indptr, peptides.len(), indices.len())?;

        let mut index = PeptideProteinIndex::default();
        for (peptide, range) in peptides.iter().zip(ranges) {
            for &ix in &indices[range] {
                index.insert(peptide.clone(), ProteinIx(ix));
            }
        }
        Ok(index)
    }
}

/// Check a CSR pointer array and turn it into one range per row
fn csr_ranges(indptr: &[u64], rows: usize, values: usize) -> Result<Vec<Range<usize>>, Error> {
    if indptr.len() != rows + 1 {
        return Err(Error::MalformedIndex(format!(
            "expected {} index pointers, found {}",
            rows + 1,
            indptr.len()
        )));
    }
    if indptr[0] != 0 || indptr[rows] as usize != values {
        return Err(Error::MalformedIndex(format!(
            "index pointers must span 0..{}",
            values
        )));
    }
    indptr
        .windows(2)
        .map(|w| match w[0] <= w[1] {
            true => Ok(w[0] as usize..w[1] as usize),
            false => Err(Error::MalformedIndex(
                "index pointers must be non-decreasing".into(),
            )),
        })
        .collect()
}

/// Theoretical spectra, sorted by peptide, stored column-wise
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectraTable {
    pub precursors: Vec<f32>,
    pub peptides: Vec<String>,
    /// `fragment_indptr[i]..fragment_indptr[i + 1]` are the fragments of row i
    pub fragment_indptr: Vec<u64>,
    pub fragment_masses: Vec<f32>,
    pub fragment_types: Vec<i8>,
}

impl SpectraTable {
    /// Flatten spectra in parallel chunks of `block` rows
    pub fn from_spectra(spectra: &[TheoreticalSpectrum], block: usize) -> Self {
        let chunks = spectra
            .par_chunks(block.max(1))
            .map(|chunk| {
                let mut table = SpectraTable::default();
                for spectrum in chunk {
                    table.push(spectrum);
                }
                table
            })
            .collect::<Vec<_>>();

        let mut table = SpectraTable {
            fragment_indptr: vec![0],
            ..Default::default()
        };
        for chunk in chunks {
            let offset = table.fragment_masses.len() as u64;
            table.precursors.extend(chunk.precursors);
            table.peptides.extend(chunk.peptides);
            table
                .fragment_indptr
                .extend(chunk.fragment_indptr.iter().map(|end| end + offset));
            table.fragment_masses.extend(chunk.fragment_masses);
            table.fragment_types.extend(chunk.fragment_types);
        }
        table
    }

    // Chunk-local rows only record end pointers; the leading 0 is added
    // once the chunks are stitched together
    fn push(&mut self, spectrum: &TheoreticalSpectrum) {
        self.precursors.push(spectrum.precursor);
        self.peptides.push(spectrum.peptide.clone());
        self.fragment_masses.extend(&spectrum.fragments);
        self.fragment_types
            .extend(spectrum.kinds.iter().map(|kind| kind.code()));
        self.fragment_indptr.push(self.fragment_masses.len() as u64);
    }

    pub fn len(&self) -> usize {
        self.peptides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peptides.is_empty()
    }

    /// Fragment masses of row `idx`
    pub fn fragments(&self, idx: usize) -> &[f32] {
        let lo = self.fragment_indptr[idx] as usize;
        let hi = self.fragment_indptr[idx + 1] as usize;
        &self.fragment_masses[lo..hi]
    }

    pub fn save<S: ArrayStore>(&self, store: &mut S) {
        store.put("precursors", self.precursors.clone().into());
        store.put("spectra_peptides", self.peptides.clone().into());
        store.put("fragment_indptr", self.fragment_indptr.clone().into());
        store.put("fragment_masses", self.fragment_masses.clone().into());
        store.put("fragment_types", self.fragment_types.clone().into());
    }

    pub fn load<S: ArrayStore>(store: &S) -> Result<Self, Error> {
        let precursors = store.get_as::<f32>("precursors")?;
        let peptides = store.get_as::<String>("spectra_peptides")?;
        let indptr = store.get_as::<u64>("fragment_indptr")?;
        let masses = store.get_as::<f32>("fragment_masses")?;
        let types = store.get_as::<i8>("fragment_types")?;

        if precursors.len() != peptides.len() || masses.len() != types.len() {
            return Err(Error::MalformedIndex(
                "spectra columns have mismatched lengths".into(),
            ));
        }
        csr_ranges(indptr, peptides.len(), masses.len())?;

        Ok(SpectraTable {
            precursors: precursors.to_vec(),
            peptides: peptides.to_vec(),
            fragment_indptr: indptr.to_vec(),
            fragment_masses: masses.to_vec(),
            fragment_types: types.to_vec(),
        })
    }
}

/// Peptide library: theoretical spectra plus the peptide -> protein index
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexedDatabase {
    pub spectra: SpectraTable,
    pub index: PeptideProteinIndex,
}

impl IndexedDatabase {
    /// Number of proteins a peptide string could have come from
    pub fn n_possible_proteins(&self, peptide: &str) -> usize {
        self.index.get(peptide).map(<[_]>::len).unwrap_or_default()
    }

    pub fn save<S: ArrayStore>(&self, store: &mut S) {
        self.index.save(store);
        self.spectra.save(store);
    }

    pub fn load<S: ArrayStore>(store: &S) -> Result<Self, Error> {
        Ok(IndexedDatabase {
            spectra: SpectraTable::load(store)?,
            index: PeptideProteinIndex::load(store)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryStore;

    fn builder() -> Builder {
        Builder {
            fasta: Some("test.fasta".into()),
            ..Default::default()
        }
    }

    fn peptides(params: &Parameters, sequence: &str) -> Vec<String> {
        params
            .generate_peptides(sequence)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn defaults() {
        let params = builder().make_parameters().unwrap();
        assert_eq!(params.protease.name, "trypsin");
        assert_eq!(params.isoforms_max, 1024);
        assert_eq!(params.n_modifications_max, 3);
        assert_eq!(params.enzyme.min_len, 7);
        assert_eq!(params.enzyme.max_len, 27);
        assert_eq!(params.enzyme.missed_cleavages, 2);
        assert!(params.decoy.pseudo_reverse);
        assert_eq!(params.mods_fixed[0].to_string(), "cC");
        assert_eq!(params.mods_variable[0].to_string(), "oxM");
        assert_eq!(params.mods_variable_terminal_prot[0].to_string(), "a<^");
        assert_eq!(params.fasta_block, 1000);
        assert_eq!(params.spectra_block, 100_000);
    }

    #[test]
    fn configuration_errors() {
        let err = Builder { fasta: None, ..builder() }.make_parameters().unwrap_err();
        assert!(matches!(err, Error::MissingParameter("fasta")));

        let err = Builder {
            protease: Some("pepsin".into()),
            ..builder()
        }
        .make_parameters()
        .unwrap_err();
        assert!(matches!(err, Error::UnknownProtease(_)));

        let err = Builder {
            mods_variable: Some(vec!["phosS".into()]),
            ..builder()
        }
        .make_parameters()
        .unwrap_err();
        assert!(matches!(err, Error::UnknownModificationMass(tag) if tag == "phos"));

        let mut mass = HashMap::new();
        mass.insert("phos".to_string(), 79.966331);
        assert!(Builder {
            mods_variable: Some(vec!["phosS".into()]),
            mods_mass: Some(mass),
            ..builder()
        }
        .make_parameters()
        .is_ok());
    }

    #[test]
    fn deserialize_builder() {
        let builder: Builder = serde_json::from_str(
            r#"{
                "protease": "lys-c",
                "mods_fixed": [],
                "AL_swap": true,
                "KR_swap": true,
                "pep_length_min": 5,
                "fasta": "x.fasta"
            }"#,
        )
        .unwrap();
        let params = builder.make_parameters().unwrap();
        assert_eq!(params.protease.name, "lys-c");
        assert!(params.mods_fixed.is_empty());
        assert!(params.decoy.al_swap && params.decoy.kr_swap);
        assert_eq!(params.enzyme.min_len, 5);
    }

    #[test]
    fn generate_targets_and_decoys() {
        let params = Builder {
            protease: Some("trypsin_full".into()),
            mods_fixed: Some(vec![]),
            mods_variable: Some(vec![]),
            mods_variable_terminal_prot: Some(vec![]),
            n_missed_cleavages: Some(0),
            pep_length_min: Some(2),
            pep_length_max: Some(20),
            ..builder()
        }
        .make_parameters()
        .unwrap();
        assert_eq!(
            peptides(&params, "PEPTIDEKR"),
            vec!["PEPTIDEK", "EDITPEPK_decoy"]
        );
    }

    #[test]
    fn modification_pipeline() {
        let params = Builder {
            mods_fixed: Some(vec!["cC".into()]),
            mods_variable: Some(vec!["oxM".into()]),
            mods_variable_terminal_prot: Some(vec!["a<^".into()]),
            n_missed_cleavages: Some(0),
            pep_length_min: Some(2),
            ..builder()
        }
        .make_parameters()
        .unwrap();
        assert_eq!(
            peptides(&params, "MCAK"),
            vec![
                "McCAK",
                "oxMcCAK",
                "AcCMK_decoy",
                "AcCoxMK_decoy",
                "aMcCAK",
                "aoxMcCAK",
                "aAcCMK_decoy",
                "aAcCoxMK_decoy",
            ]
        );
    }

    #[test]
    fn isoform_cap_counts_terminal_variants() {
        let targets = |isoforms_max| {
            let params = Builder {
                mods_fixed: Some(vec![]),
                mods_variable: Some(vec!["oxM".into()]),
                mods_variable_terminal: Some(vec!["a<^".into()]),
                mods_variable_terminal_prot: Some(vec![]),
                isoforms_max: Some(isoforms_max),
                n_missed_cleavages: Some(0),
                pep_length_min: Some(2),
                ..builder()
            }
            .make_parameters()
            .unwrap();
            params
                .generate_peptides("MMMK")
                .into_iter()
                .filter(|p| !p.decoy)
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
        };
        // Two terminal variants, each allowed 4 - 2 = 2 isoforms
        assert_eq!(targets(4), vec!["MMMK", "oxMMMK", "aMMMK", "aoxMMMK"]);
        assert_eq!(targets(3), vec!["MMMK", "aMMMK"]);
        assert_eq!(targets(1), vec!["MMMK"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = PeptideProteinIndex::default();
        assert!(a.insert("PEPTIDEK".into(), ProteinIx(2)));
        assert!(!a.insert("PEPTIDEK".into(), ProteinIx(0)));
        a.insert("LESLIEK".into(), ProteinIx(1));

        let mut merged = a.clone();
        merged.merge(a.clone());
        assert_eq!(merged, a);
        assert_eq!(
            merged.get("PEPTIDEK"),
            Some(&[ProteinIx(0), ProteinIx(2)][..])
        );
    }

    #[test]
    fn index_roundtrip_and_validation() {
        let mut index = PeptideProteinIndex::default();
        index.insert("B".into(), ProteinIx(1));
        index.insert("A".into(), ProteinIx(0));
        index.insert("A".into(), ProteinIx(1));

        let mut store = MemoryStore::default();
        index.save(&mut store);
        assert_eq!(
            store.get_as::<String>("peptides").unwrap(),
            &["A".to_string(), "B".to_string()]
        );
        assert_eq!(store.get_as::<u64>("peptide_indptr").unwrap(), &[0, 2, 3]);
        assert_eq!(store.get_as::<u32>("protein_indices").unwrap(), &[0, 1, 1]);
        assert_eq!(PeptideProteinIndex::load(&store).unwrap(), index);

        assert!(index.validate(2).is_ok());
        assert!(matches!(index.validate(1), Err(Error::MalformedIndex(_))));

        store.put("peptide_indptr", vec![0u64, 3, 2].into());
        assert!(matches!(
            PeptideProteinIndex::load(&store),
            Err(Error::MalformedIndex(_))
        ));
    }

    #[test]
    fn build_library() {
        let fasta = Fasta::parse(">P1\nMCAKPEPTIDEK\n>P2\nLESLIEKPEPTIDEK\n>P3\nPEPTIDEK\n");
        let params = Builder {
            protease: Some("trypsin_full".into()),
            pep_length_min: Some(4),
            fasta_block: Some(1),
            n_processes: Some(2),
            ..builder()
        }
        .make_parameters()
        .unwrap();

        let reports = Mutex::new(Vec::new());
        let db = params
            .build_with_progress(&fasta, |p| reports.lock().unwrap().push(p))
            .unwrap();

        assert_eq!(
            db.index.get("PEPTIDEK"),
            Some(&[ProteinIx(0), ProteinIx(1), ProteinIx(2)][..])
        );
        assert_eq!(db.n_possible_proteins("EDITPEPK_decoy"), 3);
        assert_eq!(db.n_possible_proteins("LESLIEK"), 1);
        assert_eq!(db.n_possible_proteins("NOTHERE"), 0);
        assert!(db.index.validate(fasta.len()).is_ok());

        // One spectrum per unique peptide, sorted
        assert_eq!(db.spectra.len(), db.index.len());
        assert!(db.spectra.peptides.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(db.spectra.fragment_indptr.len(), db.spectra.len() + 1);

        let reports = reports.into_inner().unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(reports.last(), Some(&1.0));

        let mut store = MemoryStore::default();
        db.save(&mut store);
        assert_eq!(IndexedDatabase::load(&store).unwrap(), db);
    }

    /// Fails on every peptide of one protein
    struct FailOn(&'static str);

    impl Fragmenter for FailOn {
        fn fragment(&self, peptide: &Peptide) -> Result<TheoreticalSpectrum, Error> {
            match peptide.residues() == self.0 {
                true => Err(Error::InvalidSequence(peptide.to_string())),
                false => Ok(TheoreticalSpectrum {
                    precursor: 0.0,
                    peptide: peptide.to_string(),
                    fragments: Vec::new(),
                    kinds: Vec::new(),
                }),
            }
        }
    }

    #[test]
    fn worker_failure_aborts_build() {
        let fasta = Fasta::parse(">P1\nMCAKPEPTIDEK\n>P2\nLESLIEK\n>P3\nPEPTIDEK\n");
        let params = Builder {
            protease: Some("trypsin_full".into()),
            pep_length_min: Some(4),
            mods_fixed: Some(Vec::new()),
            mods_variable: Some(Vec::new()),
            mods_variable_terminal_prot: Some(Vec::new()),
            fasta_block: Some(1),
            n_processes: Some(2),
            ..builder()
        }
        .make_parameters()
        .unwrap();

        let result = params.build_with(&fasta, &FailOn("LESLIEK"), |_| {});
        assert!(matches!(result, Err(Error::InvalidSequence(s)) if s == "LESLIEK"));

        // The same fragmenter succeeds once the failing protein is gone
        let fasta = Fasta::parse(">P1\nMCAKPEPTIDEK\n>P3\nPEPTIDEK\n");
        assert!(params.build_with(&fasta, &FailOn("LESLIEK"), |_| {}).is_ok());
    }

    #[test]
    fn empty_inputs() {
        let params = builder().make_parameters().unwrap();
        assert!(matches!(
            params.build(&Fasta::default()),
            Err(Error::EmptyFasta(_))
        ));
        // Every peptide is shorter than the minimum length
        let fasta = Fasta::parse(">P1\nAKAKAK\n");
        assert!(matches!(params.build(&fasta), Err(Error::EmptyLibrary)));
    }
}
