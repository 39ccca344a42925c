use razor_core::fdr::Ranked;
use razor_core::protein_grouping::Grouped;
use razor_core::psm::Psm;
use rayon::prelude::*;

use crate::runner::Runner;

/// A PSM that passed every FDR level, annotated with its protein group
pub type Identified = Grouped<Ranked<Psm>>;

fn push_optional(record: &mut csv::ByteRecord, value: Option<u32>) {
    match value {
        Some(value) => record.push_field(itoa::Buffer::new().format(value).as_bytes()),
        None => record.push_field(b""),
    }
}

impl Runner {
    pub fn serialize_identification(&self, ident: &Identified) -> csv::ByteRecord {
        let ranked = &ident.row;
        let psm = &ranked.row;
        let annotation = &ident.annotation;

        let mut record = csv::ByteRecord::new();
        record.push_field(itoa::Buffer::new().format(psm.query_id).as_bytes());
        record.push_field(psm.sequence.as_bytes());
        record.push_field(ryu::Buffer::new().format(psm.score).as_bytes());
        record.push_field(itoa::Buffer::new().format(label(psm.decoy)).as_bytes());
        push_optional(&mut record, psm.feature_id);
        push_optional(&mut record, psm.precursor_id);
        record.push_field(itoa::Buffer::new().format(ranked.target_cum).as_bytes());
        record.push_field(itoa::Buffer::new().format(ranked.decoy_cum).as_bytes());
        record.push_field(ryu::Buffer::new().format(ranked.fdr).as_bytes());
        record.push_field(ryu::Buffer::new().format(ranked.q_value).as_bytes());
        record.push_field(annotation.protein.as_bytes());
        record.push_field(annotation.protein_group.as_bytes());
        record.push_field(
            itoa::Buffer::new()
                .format(annotation.protein_group.split(',').count())
                .as_bytes(),
        );
        record.push_field(itoa::Buffer::new().format(annotation.razor as u8).as_bytes());
        record
    }

    pub fn write_identifications(&self, idents: &[Identified]) -> anyhow::Result<String> {
        let path = self.make_path("results.razor.tsv");

        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        let headers = csv::ByteRecord::from(vec![
            "query_id",
            "peptide",
            "score",
            "label",
            "feature_id",
            "precursor_id",
            "target_cum",
            "decoy_cum",
            "fdr",
            "q_value",
            "protein",
            "protein_group",
            "num_proteins",
            "razor",
        ]);

        wtr.write_byte_record(&headers)?;
        for record in idents
            .par_iter()
            .map(|ident| self.serialize_identification(ident))
            .collect::<Vec<_>>()
        {
            wtr.write_byte_record(&record)?;
        }

        wtr.flush()?;
        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)?;
        Ok(path.display().to_string())
    }
}

/// Percolator-style label: 1 for targets, -1 for decoys
fn label(decoy: bool) -> i32 {
    match decoy {
        true => -1,
        false => 1,
    }
}
