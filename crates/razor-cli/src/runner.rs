use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use fnv::FnvHashSet;
use log::info;
use razor_core::database::IndexedDatabase;
use razor_core::fasta::Fasta;
use razor_core::fdr::{cut_fdr, cut_global_fdr, filter_precursor, filter_score};
use razor_core::protein_grouping::perform_protein_grouping;
use razor_core::psm::Psm;
use razor_core::store::JsonStore;

use super::input::Search;
use super::output::Identified;

pub struct Runner {
    pub database: IndexedDatabase,
    pub fasta: Fasta,
    pub parameters: Search,
    start: Instant,
}

impl Runner {
    pub fn new(parameters: Search) -> anyhow::Result<Self> {
        let start = Instant::now();
        let fasta = razor_core::read_fasta(&parameters.database.fasta).with_context(|| {
            format!(
                "Failed to build database from `{}`",
                parameters.database.fasta
            )
        })?;

        let database = parameters
            .database
            .build_with_progress(&fasta, |fraction| {
                log::trace!("- digested {:.0}% of proteins", fraction * 100.0)
            })
            .with_context(|| {
                format!(
                    "Failed to build database from `{}`",
                    parameters.database.fasta
                )
            })?;

        info!(
            "generated {} theoretical spectra, {} peptides from {} proteins in {:#?}",
            database.spectra.len(),
            database.index.len(),
            fasta.len(),
            start.elapsed()
        );

        Ok(Self {
            database,
            fasta,
            parameters,
            start,
        })
    }

    pub(crate) fn make_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.parameters.output_directory.join(file_name.as_ref())
    }

    /// Read a tab-separated PSM table with a header row
    pub fn read_psms(path: &str) -> anyhow::Result<Vec<Psm>> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)
            .with_context(|| format!("Failed to open PSMs from `{path}`"))?;
        let psms = rdr
            .deserialize()
            .collect::<Result<Vec<Psm>, _>>()
            .with_context(|| format!("Failed to parse PSMs from `{path}`"))?;
        log::trace!("- {}: read {} PSMs", path, psms.len());
        Ok(psms)
    }

    /// Reduce raw search-engine output to the PSMs passing every configured
    /// FDR level, annotated with their protein groups
    pub fn identify(&self, psms: Vec<Psm>) -> Vec<Identified> {
        let settings = self.parameters.fdr;
        let n_psms = psms.len();

        let psms = filter_precursor(filter_score(psms, settings.filter_mode));
        log::trace!("- {} of {} PSMs are top-ranked", psms.len(), n_psms);

        let passing = cut_fdr(psms, settings.peptide_fdr);
        let passing = cut_global_fdr(
            passing,
            |ranked| ranked.row.sequence.clone(),
            settings.peptide_fdr,
        );

        let grouped = perform_protein_grouping(passing, &self.database.index, &self.fasta);
        cut_global_fdr(
            grouped,
            |ident| ident.annotation.protein_group.clone(),
            settings.protein_fdr,
        )
    }

    fn write_library(&self) -> anyhow::Result<String> {
        let mut store = JsonStore::create(self.make_path("library.json"));
        self.database.save(&mut store);
        store.flush()?;
        Ok(store.path().display().to_string())
    }

    pub fn run(mut self) -> anyhow::Result<Search> {
        let path = self.write_library()?;
        self.parameters.output_paths.push(path);

        if !self.parameters.psm_paths.is_empty() {
            let mut psms = Vec::new();
            for path in &self.parameters.psm_paths {
                psms.extend(Self::read_psms(path)?);
            }
            info!("read {} PSMs in {:#?}", psms.len(), self.start.elapsed());

            let idents = self.identify(psms);
            let targets = idents.iter().filter(|ident| !ident.row.row.decoy);
            let peptides = targets
                .clone()
                .map(|ident| ident.row.row.sequence.as_str())
                .collect::<FnvHashSet<_>>();
            let proteins = targets
                .map(|ident| ident.annotation.protein_group.as_str())
                .collect::<FnvHashSet<_>>();

            info!(
                "discovered {} target peptides at {} FDR",
                peptides.len(),
                self.parameters.fdr.peptide_fdr
            );
            info!(
                "discovered {} target protein groups at {} FDR",
                proteins.len(),
                self.parameters.fdr.protein_fdr
            );
            log::trace!("writing outputs");

            let path = self.write_identifications(&idents)?;
            self.parameters.output_paths.push(path);
        }

        let path = self.make_path("results.json");
        self.parameters
            .output_paths
            .push(path.display().to_string());
        println!("{}", serde_json::to_string_pretty(&self.parameters)?);

        let bytes = serde_json::to_vec_pretty(&self.parameters)?;
        std::fs::write(&path, bytes)?;

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}
