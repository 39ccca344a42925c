use serde::Serialize;

use crate::database::ProteinIx;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProteinRecord {
    /// Accession, e.g. `P02769` for `sp|P02769|ALBU_BOVIN`
    pub id: String,
    /// First whitespace-delimited token of the header
    pub name: String,
    /// Full header line, without the leading `>`
    pub description: String,
    pub sequence: String,
}

impl ProteinRecord {
    fn new(header: &str, sequence: String) -> Self {
        let name = header.split_ascii_whitespace().next().unwrap_or_default();
        let id = name.split('|').nth(1).filter(|s| !s.is_empty()).unwrap_or(name);
        ProteinRecord {
            id: id.into(),
            name: name.into(),
            description: header.into(),
            sequence,
        }
    }
}

/// Protein records keyed by their position in the file
#[derive(Clone, Debug, Default)]
pub struct Fasta {
    pub proteins: Vec<ProteinRecord>,
}

impl Fasta {
    // Parse a string into a fasta database
    pub fn parse(contents: &str) -> Fasta {
        let mut proteins = Vec::new();
        let mut header: Option<&str> = None;
        let mut s = String::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(next) = line.strip_prefix('>') {
                if let Some(header) = header {
                    if !s.is_empty() {
                        proteins.push(ProteinRecord::new(header, std::mem::take(&mut s)));
                    }
                }
                s.clear();
                header = Some(next.trim());
            } else if header.is_some() {
                s.push_str(line);
            }
        }

        if let Some(header) = header {
            if !s.is_empty() {
                proteins.push(ProteinRecord::new(header, s));
            }
        }

        Fasta { proteins }
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }

    pub fn get(&self, ix: ProteinIx) -> Option<&ProteinRecord> {
        self.proteins.get(ix.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProteinIx, &ProteinRecord)> {
        self.proteins
            .iter()
            .enumerate()
            .map(|(ix, p)| (ProteinIx(ix as u32), p))
    }
}

impl std::ops::Index<ProteinIx> for Fasta {
    type Output = ProteinRecord;

    fn index(&self, index: ProteinIx) -> &Self::Output {
        &self.proteins[index.0 as usize]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_headers() {
        let fasta = Fasta::parse(
            ">sp|P02769|ALBU_BOVIN Serum albumin OS=Bos taurus\nMKWVTFISLL\nLLFSSAYS\n\n>PROT2\nPEPTIDEK\n>empty\n",
        );
        assert_eq!(fasta.len(), 2);
        let albu = &fasta[ProteinIx(0)];
        assert_eq!(albu.id, "P02769");
        assert_eq!(albu.name, "sp|P02769|ALBU_BOVIN");
        assert_eq!(albu.description, "sp|P02769|ALBU_BOVIN Serum albumin OS=Bos taurus");
        assert_eq!(albu.sequence, "MKWVTFISLLLLFSSAYS");

        let prot2 = fasta.get(ProteinIx(1)).unwrap();
        assert_eq!(prot2.id, "PROT2");
        assert_eq!(prot2.sequence, "PEPTIDEK");
        assert!(fasta.get(ProteinIx(2)).is_none());
    }

    #[test]
    fn empty_header() {
        let fasta = Fasta::parse(">\nPEPTIDE\n");
        assert_eq!(fasta.len(), 1);
        assert_eq!(fasta.proteins[0].name, "");
        assert!(Fasta::parse("no header here\n").is_empty());
    }
}
