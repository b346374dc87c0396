use super::amino_acids::AminoAcidTable;

#[derive(Debug, Clone)]
pub struct Protein {
    pub name: String,
    pub description: String,
    /// Sequence as written in the database, unknown letters included.
    pub sequence: String,
    /// Residue ids, C-terminus first. This is the orientation rows are walked in.
    residues: Vec<u8>,
}

impl Protein {
    pub fn new(name: String, description: String, sequence: String) -> Self {
        let mut residues: Vec<u8> = sequence.chars().filter_map(AminoAcidTable::id_of).collect();
        residues.reverse();
        Self {
            name,
            description,
            sequence,
            residues,
        }
    }

    pub fn residues(&self) -> &[u8] {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProteinDatabase {
    proteins: Vec<Protein>,
    max_length: usize,
}

impl ProteinDatabase {
    pub fn new(proteins: Vec<Protein>) -> Self {
        let max_length = proteins.iter().map(|p| p.len()).max().unwrap_or(0);
        Self {
            proteins,
            max_length,
        }
    }

    pub fn proteins(&self) -> &[Protein] {
        &self.proteins
    }

    pub fn get(&self, id: usize) -> Option<&Protein> {
        self.proteins.get(id)
    }

    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }

    /// Longest residue sequence, used to size the per-worker buffers.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Formats where `peptide` occurs, e.g. `sp|P1|[3,9]` or
    /// `(sp|P1|[3,9],[20,26])`. Positions are 0-based and inclusive; at most
    /// three proteins and three positions per protein are listed.
    pub fn peptide_positions(&self, peptide: &str) -> String {
        let mut out = String::new();
        if peptide.is_empty() {
            return out;
        }
        let mut found = 0;
        for protein in self.proteins.iter() {
            let hits = occurrences(&protein.sequence, peptide);
            if hits.is_empty() {
                continue;
            }
            if found == 3 {
                out.push_str(", ...");
                break;
            }
            if found > 0 {
                out.push_str(", ");
            }
            found += 1;
            let end_offset = peptide.len() - 1;
            if hits.len() == 1 {
                out.push_str(&format!("{}[{},{}]", protein.name, hits[0], hits[0] + end_offset));
            } else {
                out.push_str(&format!("({}", protein.name));
                for (i, start) in hits.iter().take(3).enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&format!("[{},{}]", start, start + end_offset));
                }
                if hits.len() > 3 {
                    out.push_str(",...");
                }
                out.push(')');
            }
        }
        out
    }
}

/// Start offsets of `needle` in `haystack`, overlapping matches included.
fn occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(offset) = haystack.get(from..).and_then(|x| x.find(needle)) {
        out.push(from + offset);
        from += offset + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ProteinDatabase {
        ProteinDatabase::new(vec![
            Protein::new("P1".into(), ">sp|P1|".into(), "MKPEPTIDEK".into()),
            Protein::new("P2".into(), ">sp|P2|".into(), "PEPTIDEXPEPTIDE".into()),
            Protein::new("P3".into(), ">sp|P3|".into(), "AAAA".into()),
        ])
    }

    #[test]
    fn test_residues_are_reversed() {
        let p = Protein::new("x".into(), "x".into(), "PEXK".into());
        let letters: String = p.residues().iter().map(|&x| AminoAcidTable::letter(x)).collect();
        assert_eq!(letters, "KEP");
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_max_length() {
        assert_eq!(db().max_length(), 14);
    }

    #[test]
    fn test_peptide_positions() {
        let db = db();
        assert_eq!(db.peptide_positions("PEPTIDE"), "P1[2,8], (P2[0,6],[8,14])");
        assert_eq!(db.peptide_positions("AAA"), "(P3[0,2],[1,3])");
        assert_eq!(db.peptide_positions("WWW"), "");
    }

    #[test]
    fn test_peptide_positions_truncates() {
        let proteins = (0..5)
            .map(|i| Protein::new(format!("P{}", i), String::new(), "GGGGG".into()))
            .collect();
        let db = ProteinDatabase::new(proteins);
        let out = db.peptide_positions("GGGG");
        assert!(out.ends_with(", ..."));
        assert_eq!(out.matches("(P").count(), 3);
    }
}
