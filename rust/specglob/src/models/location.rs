use super::protein::Protein;

/// A region of one protein a coarse alignment pointed at.
///
/// Rows are 1-based positions in the reversed residue sequence, so
/// `start_row` is closer to the C-terminus than `end_row`. Both may lie
/// outside the protein once the surplus is added; [`Location::from_candidate`]
/// clamps them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub start_row: i64,
    pub end_row: i64,
    pub score: i32,
    pub protein_id: Option<usize>,
    pub spectrum_id: usize,
}

impl Candidate {
    pub fn empty(min_score: i32) -> Self {
        Self {
            start_row: 0,
            end_row: 0,
            score: min_score,
            protein_id: None,
            spectrum_id: 0,
        }
    }
}

/// Window `[beginning, beginning + length)` of a protein's reversed residues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub protein_id: usize,
    pub beginning: usize,
    pub length: usize,
}

impl Location {
    /// `None` when the candidate has no protein or the clamped window is empty.
    pub fn from_candidate(candidate: &Candidate, protein: &Protein) -> Option<Self> {
        let protein_id = candidate.protein_id?;
        if protein.is_empty() {
            return None;
        }
        let last = protein.len() as i64 - 1;
        let beginning = (candidate.start_row - 1).max(0);
        let end = (candidate.end_row - 1).min(last);
        if end < beginning {
            return None;
        }
        Some(Self {
            protein_id,
            beginning: beginning as usize,
            length: (end - beginning + 1) as usize,
        })
    }

    /// Residue ids of the window, C-terminus first.
    pub fn residues<'a>(&self, protein: &'a Protein) -> &'a [u8] {
        &protein.residues()[self.beginning..self.beginning + self.length]
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(start_row: i64, end_row: i64) -> Candidate {
        Candidate {
            start_row,
            end_row,
            score: 30,
            protein_id: Some(0),
            spectrum_id: 0,
        }
    }

    #[test]
    fn test_location_is_clamped() {
        let protein = Protein::new("P".into(), "P".into(), "MKPEPTIDEK".into());
        let location = Location::from_candidate(&candidate(-7, 40), &protein).unwrap();
        assert_eq!(location.beginning, 0);
        assert_eq!(location.length, 10);

        let location = Location::from_candidate(&candidate(3, 6), &protein).unwrap();
        assert_eq!(location.beginning, 2);
        assert_eq!(location.length, 4);
        // Reversed sequence is KEDITPEPKM
        let letters: String = location
            .residues(&protein)
            .iter()
            .map(|&x| crate::models::AminoAcidTable::letter(x))
            .collect();
        assert_eq!(letters, "DITP");
    }

    #[test]
    fn test_empty_location() {
        let protein = Protein::new("P".into(), "P".into(), "MKPEPTIDEK".into());
        assert!(Location::from_candidate(&candidate(12, 11), &protein).is_none());
        assert!(Location::from_candidate(&Candidate::empty(0), &protein).is_none());
    }
}
