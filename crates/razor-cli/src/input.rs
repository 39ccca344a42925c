use std::path::PathBuf;

use anyhow::{ensure, Context};
use clap::ArgMatches;
use razor_core::database::{Builder, Parameters};
use razor_core::fdr::{FdrBuilder, FdrSettings};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
/// Actual run parameters - may include overrides or default values not set by user
pub struct Search {
    pub version: String,
    pub database: Parameters,
    pub fdr: FdrSettings,
    pub psm_paths: Vec<String>,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Deserialize, Default)]
/// Input parameters deserialized from JSON file
pub struct Input {
    pub database: Builder,
    pub fdr: Option<FdrBuilder>,
    pub output_directory: Option<String>,
    pub psm_paths: Option<Vec<String>>,
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("`parameters` must be provided")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(fasta) = matches.get_one::<String>("fasta") {
            log::trace!("overriding `database.fasta` parameter.");
            input.database.update_fasta(fasta.into());
        }
        if let Some(psm_paths) = matches.get_many::<String>("psm_paths") {
            log::trace!("overriding `psm_paths` parameter.");
            input.psm_paths = Some(psm_paths.map(|p| p.into()).collect());
        }

        ensure!(
            input.output_directory.is_some(),
            "`output_directory` must be set. For more information try '--help'"
        );
        ensure!(
            input.database.fasta.is_some(),
            "`database.fasta` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        razor_core::read_json(path.as_ref()).map_err(anyhow::Error::from)
    }

    pub fn build(mut self) -> anyhow::Result<Search> {
        if self.database.n_processes.is_none() {
            self.database.n_processes = Some(num_cpus::get());
        }
        let database = self.database.make_parameters()?;
        let fdr = self.fdr.unwrap_or_default().make_parameters()?;
        if fdr.protein_fdr < fdr.peptide_fdr {
            log::warn!(
                "`protein_fdr` ({}) is stricter than `peptide_fdr` ({})",
                fdr.protein_fdr,
                fdr.peptide_fdr
            );
        }

        let psm_paths = self.psm_paths.unwrap_or_default();
        if psm_paths.is_empty() {
            log::info!("no PSM files given, only the peptide library will be built");
        }

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Search {
            version: clap::crate_version!().into(),
            database,
            fdr,
            psm_paths,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_filled() -> anyhow::Result<()> {
        let input: Input = serde_json::from_str(
            r#"{
                "database": { "fasta": "proteins.fasta", "n_processes": 2 },
                "fdr": { "peptide_fdr": 0.05 }
            }"#,
        )?;
        let search = input.build()?;
        assert_eq!(search.database.n_processes, 2);
        assert_eq!(search.fdr.peptide_fdr, 0.05);
        assert_eq!(search.fdr.protein_fdr, 0.01);
        assert!(search.psm_paths.is_empty());
        Ok(())
    }

    #[test]
    fn invalid_fdr_is_rejected() {
        let input = Input {
            database: Builder {
                fasta: Some("proteins.fasta".into()),
                ..Default::default()
            },
            fdr: Some(FdrBuilder {
                protein_fdr: Some(1.5),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(input.build().is_err());
    }

    #[test]
    fn missing_fasta_is_rejected() {
        assert!(Input::default().build().is_err());
    }
}
