//! Dynamic-programming alignment of a transformed spectrum against protein
//! sequences.
//!
//! Rows are residues of a protein read from the C-terminus (row `r` is
//! residue `r - 1` of the reversed sequence); columns are the columns of a
//! [`TransformedSpectrum`](crate::transform::TransformedSpectrum). A cell
//! holds the best score of an alignment whose last residue is the row and
//! whose last explained mass is the column.
//!
//! The coarse pass ([`coarse`]) runs over every protein and fills the
//! [`candidate_heap`]. The refined pass ([`refined`]) reruns the DP on each
//! candidate window and keeps back-pointers, from which [`result`] rebuilds an
//! [`Alignment`]. [`post_processing`] then tries non-aligned masses and
//! removes peaks used twice.

pub mod candidate_heap;
pub mod coarse;
pub mod post_processing;
pub mod refined;
pub mod result;

pub use candidate_heap::CandidateHeap;
pub use coarse::CoarseScanner;
pub use post_processing::PostProcessor;
pub use refined::{
    BestCell,
    RefinedAligner,
    ScenarioMatrix,
};
pub use result::{
    Alignment,
    RenderedAlignment,
};

use crate::models::amino_acids::AminoAcidTable;

/// Prefix sums of the residue masses of the sequence being aligned, used to
/// test realignments in constant time.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResidueMasses {
    prefix: Vec<f64>,
}

impl ResidueMasses {
    pub(crate) fn reserve(&mut self, residues: usize) {
        self.prefix
            .reserve((residues + 1).saturating_sub(self.prefix.len()));
    }

    pub(crate) fn fill(&mut self, residues: &[u8], table: &AminoAcidTable) {
        self.prefix.clear();
        self.prefix.push(0.0);
        let mut total = 0.0;
        for &aa in residues {
            total += table.mass(aa);
            self.prefix.push(total);
        }
    }

    /// Mass of the `len + 1` residues right before `row`; `None` when the
    /// sequence does not have that many.
    #[inline]
    pub(crate) fn preceding(&self, row: usize, len: usize) -> Option<f64> {
        if row < len + 2 {
            return None;
        }
        Some(self.prefix[row - 1] - self.prefix[row - 2 - len])
    }
}

/// Number of residues before `row` that explain `shift` when the alignment
/// restarts from column 0, with at most `cap` residues when given.
pub(crate) fn realign_from_first(
    masses: &ResidueMasses,
    row: usize,
    shift: f64,
    accuracy: f64,
    cap: Option<usize>,
) -> Option<usize> {
    let mut len = 0;
    loop {
        if cap.is_some_and(|c| len >= c) {
            return None;
        }
        let mass = masses.preceding(row, len)?;
        if shift - accuracy > mass {
            len += 1;
            continue;
        }
        return ((shift - mass).abs() <= accuracy).then_some(len + 1);
    }
}

/// Whether the residues skipped between a cell last updated at `cell_row`
/// and `row` explain `shift`.
#[inline]
pub(crate) fn realigns_from(
    masses: &ResidueMasses,
    row: usize,
    cell_row: usize,
    shift: f64,
    accuracy: f64,
    cap: Option<usize>,
) -> bool {
    if row < cell_row + 2 {
        return false;
    }
    let len = row - cell_row - 2;
    if cap.is_some_and(|c| len >= c) {
        return false;
    }
    masses
        .preceding(row, len)
        .is_some_and(|mass| (mass - shift).abs() <= accuracy)
}

/// Score of a cell last written at `cell_row`, carried down to `row`.
#[inline]
pub(crate) fn carried(score: i32, cell_row: usize, row: usize, not_found: i32) -> i32 {
    score + not_found * (row - cell_row) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masses(sequence: &str) -> (ResidueMasses, AminoAcidTable) {
        let table = AminoAcidTable::default();
        let residues: Vec<u8> = sequence
            .chars()
            .map(|c| AminoAcidTable::id_of(c).unwrap())
            .collect();
        let mut out = ResidueMasses::default();
        out.fill(&residues, &table);
        (out, table)
    }

    #[test]
    fn test_preceding() {
        let (m, table) = masses("GAS");
        let g = table.mass(0);
        let a = table.mass(1);
        assert_eq!(m.preceding(1, 0), None);
        assert!((m.preceding(2, 0).unwrap() - g).abs() < 1e-12);
        assert!((m.preceding(3, 0).unwrap() - a).abs() < 1e-12);
        assert!((m.preceding(3, 1).unwrap() - (g + a)).abs() < 1e-12);
        assert_eq!(m.preceding(3, 2), None);
    }

    #[test]
    fn test_realign_from_first() {
        let (m, table) = masses("GAGAS");
        let two = table.mass(1) + table.mass(0);
        // Row 5 is S; the residues before it are A, G, A, G
        assert_eq!(realign_from_first(&m, 5, two, 0.02, None), Some(2));
        assert_eq!(realign_from_first(&m, 5, two, 0.02, Some(1)), None);
        assert_eq!(realign_from_first(&m, 5, two + 5.0, 0.02, None), None);
        assert_eq!(realign_from_first(&m, 1, two, 0.02, None), None);
    }

    #[test]
    fn test_realigns_from() {
        let (m, table) = masses("GAGAS");
        let a = table.mass(1);
        // A cell written at row 3 skips row 4 to reach row 5
        assert!(realigns_from(&m, 5, 3, a, 0.02, None));
        assert!(!realigns_from(&m, 5, 3, a, 0.02, Some(0)));
        assert!(!realigns_from(&m, 5, 4, a, 0.02, None));
        assert_eq!(carried(10, 2, 5, -4), -2);
    }
}
