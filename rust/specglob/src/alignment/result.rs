use super::refined::{
    BestCell,
    ScenarioMatrix,
};
use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::models::amino_acids::{
    AminoAcidTable,
    H_MASS,
};
use crate::models::location::Location;
use crate::models::spectrum::NativeSpectrum;
use crate::transform::{
    PeakChoice,
    TransformedSpectrum,
};
use std::cmp::Ordering;

/// One residue of a reconstructed alignment: the cell it lands on and the
/// cell it comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentStep {
    pub row: usize,
    pub column: usize,
    pub mass: f64,
    pub double: bool,
    pub anchor: bool,
    pub aa: u8,
    pub right_peak: usize,
    pub left_peak: usize,
    pub left_is_anchor: bool,
    /// Column a found step would come from.
    pub found_column: usize,
    pub previous_row: usize,
    pub previous_column: usize,
    pub previous_mass: f64,
}

impl AlignmentStep {
    /// Mass between the previous column and this residue's left side.
    #[inline]
    fn shift(&self, table: &AminoAcidTable) -> f64 {
        self.mass - table.mass(self.aa) - self.previous_mass
    }
}

/// Alignment and peptide strings, N-terminus first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedAlignment {
    pub alignment: String,
    pub peptide: String,
}

/// A refined alignment of a spectrum against a location.
///
/// The alignment owns everything it needs once built, so it can outlive the
/// transformed spectrum and the back-pointer matrix it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub spectrum_id: usize,
    pub location: Location,
    pub score: i32,
    pub peaks_in_common: u32,
    pub non_aligned_mass: f64,
    pub peak_mask: Vec<PeakChoice>,
    /// Highest row first.
    steps: Vec<AlignmentStep>,
    last_mass: f64,
    accuracy: f64,
    middle_peak: usize,
}

impl Alignment {
    /// Walks the back-pointers from `best` down to column 0.
    pub fn reconstruct(
        best: BestCell,
        matrix: &ScenarioMatrix,
        transformed: &TransformedSpectrum,
        spectrum: &NativeSpectrum,
        location: Location,
        residues: &[u8],
        table: &AminoAcidTable,
    ) -> Result<Self> {
        let mut steps = Vec::new();
        let (mut row, mut column) = (best.row, best.column);
        while column != 0 {
            let scenario = matrix
                .get(row, column)
                .ok_or(DataProcessingError::BrokenBackpointer {
                    row,
                    column,
                    context: "outside of the scenario matrix".to_string(),
                })?;
            // Cells of row 0 are never written: the chain starts there
            let Some(position_ref) = scenario.position else {
                break;
            };
            let position = transformed
                .positions(position_ref.aa)
                .get(position_ref.index as usize)
                .ok_or(DataProcessingError::IndexOutOfBounds {
                    index: position_ref.index as usize,
                    len: transformed.positions(position_ref.aa).len(),
                    context: format!("amino-acid position of cell ({}, {})", row, column),
                })?;
            if scenario.previous_row >= row || scenario.previous_column >= column {
                return Err(DataProcessingError::BrokenBackpointer {
                    row,
                    column,
                    context: format!(
                        "points forward to ({}, {})",
                        scenario.previous_row, scenario.previous_column
                    ),
                }
                .into());
            }
            steps.push(AlignmentStep {
                row,
                column,
                mass: transformed.column_mass(column),
                double: transformed.is_double(column),
                anchor: transformed.is_anchor(column),
                aa: position_ref.aa,
                right_peak: position.right_peak,
                left_peak: position.left_peak,
                left_is_anchor: transformed.is_anchor_peak(position.left_peak),
                found_column: position.found_column(),
                previous_row: scenario.previous_row,
                previous_column: scenario.previous_column,
                previous_mass: transformed.column_mass(scenario.previous_column),
            });
            row = scenario.previous_row;
            column = scenario.previous_column;
        }
        if steps.is_empty() {
            return Err(DataProcessingError::ExpectedNonEmptyData {
                context: Some(format!(
                    "alignment of spectrum {} ending at ({}, {})",
                    transformed.spectrum_id(),
                    best.row,
                    best.column
                )),
            }
            .into());
        }

        let mut out = Self {
            spectrum_id: transformed.spectrum_id(),
            location,
            score: best.score,
            peaks_in_common: 0,
            non_aligned_mass: transformed.non_aligned_mass(),
            peak_mask: transformed.peak_mask().to_vec(),
            steps,
            last_mass: transformed.last_mass(),
            accuracy: transformed.accuracy(),
            middle_peak: transformed.middle_peak(),
        };
        out.peaks_in_common = out.count_peaks_in_common(transformed, spectrum, residues, table);
        Ok(out)
    }

    pub fn steps(&self) -> &[AlignmentStep] {
        &self.steps
    }

    pub fn middle_peak(&self) -> usize {
        self.middle_peak
    }

    /// Higher score first, then more peaks in common.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .cmp(&self.score)
            .then(other.peaks_in_common.cmp(&self.peaks_in_common))
    }

    fn terminal(&self) -> &AlignmentStep {
        // Never empty once reconstructed
        &self.steps[0]
    }

    fn leading_shift(&self) -> f64 {
        let shift = self.last_mass - self.terminal().mass;
        if shift > self.accuracy { shift } else { 0.0 }
    }

    /// Number of residues past the terminal row that explain the leading
    /// shift, when two or more do.
    fn leading_realignment(&self, residues: &[u8], table: &AminoAcidTable) -> Option<usize> {
        let shift = self.leading_shift();
        let line = self.terminal().row;
        if shift <= self.accuracy || line + 1 >= residues.len() {
            return None;
        }
        let mut len = 2;
        let mut sum = table.mass(residues[line]) + table.mass(residues[line + 1]);
        while line + len < residues.len() && shift - self.accuracy > sum {
            sum += table.mass(residues[line + len]);
            len += 1;
        }
        ((shift - sum).abs() <= self.accuracy).then_some(len)
    }

    fn count_peaks_in_common(
        &self,
        transformed: &TransformedSpectrum,
        spectrum: &NativeSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
    ) -> u32 {
        let mut count = 0;
        if let Some(len) = self.leading_realignment(residues, table) {
            let line = self.terminal().row;
            let mut mass = self.last_mass;
            for k in (2..=len).rev() {
                mass -= table.mass(residues[line - 1 + k]);
                count += transformed.mass_count(spectrum, mass);
            }
        }

        for step in self.steps.iter() {
            if !step.anchor {
                count += if step.double { 2 } else { 1 };
            }
            let shift = step.shift(table);
            if shift <= self.accuracy {
                continue;
            }
            count += transformed.mass_count(spectrum, step.mass - table.mass(step.aa));
            let skipped = skipped_mass(residues, table, step);
            if (shift - skipped).abs() <= self.accuracy {
                let mut mass = step.previous_mass;
                for k in 1..(step.row - step.previous_row - 1) {
                    mass += table.mass(residues[step.previous_row + k - 1]);
                    count += transformed.mass_count(spectrum, mass);
                }
            }
        }
        count
    }

    /// Renders the alignment, e.g. `PEP[T][13.98]IDE` or `[57.02]PEPTIDE`.
    pub fn render(&self, residues: &[u8], table: &AminoAcidTable) -> RenderedAlignment {
        let mut alignment = String::new();
        let mut peptide = String::new();

        let shift = self.leading_shift();
        if shift > self.accuracy {
            match self.leading_realignment(residues, table) {
                Some(len) => {
                    let line = self.terminal().row;
                    for idx in (line..line + len).rev() {
                        let letter = AminoAcidTable::letter(residues[idx]);
                        alignment.push_str(&format!("[{}]", letter));
                        peptide.push(letter);
                    }
                }
                None => {
                    alignment.push_str(&format!("[{:.2}]", shift));
                }
            }
        }

        for step in self.steps.iter() {
            let letter = AminoAcidTable::letter(step.aa);
            alignment.push(letter);
            peptide.push(letter);
            for row in (step.previous_row + 1..step.row).rev() {
                let letter = AminoAcidTable::letter(residues[row - 1]);
                alignment.push_str(&format!("[{}]", letter));
                peptide.push(letter);
            }
            let unexplained = step.shift(table) - skipped_mass(residues, table, step);
            if unexplained.abs() > self.accuracy {
                alignment.push_str(&format!("[{:.2}]", unexplained));
            }
        }
        RenderedAlignment { alignment, peptide }
    }

    /// Masses worth retrying as a non-aligned mass: unexplained internal
    /// shifts first, then the N-terminal and C-terminal leftovers with every
    /// residue that could absorb part of them.
    pub fn non_aligned_mass_candidates(
        &self,
        residues: &[u8],
        table: &AminoAcidTable,
    ) -> Vec<f64> {
        let mut internal = Vec::new();
        for step in self.steps.iter().filter(|x| x.previous_column > 0) {
            let unexplained = step.shift(table) - skipped_mass(residues, table, step);
            if unexplained > self.accuracy {
                internal.push(unexplained);
            }
        }

        let mut n_term = Vec::new();
        let line = self.terminal().row;
        let shift = self.leading_shift();
        if shift > self.accuracy
            && line < residues.len()
            && self.leading_realignment(residues, table).is_none()
        {
            let mut remaining = shift - table.mass(residues[line]);
            let mut idx = line;
            while remaining > -H_MASS - self.accuracy {
                n_term.push(remaining);
                idx += 1;
                if idx == residues.len() {
                    break;
                }
                remaining -= table.mass(residues[idx]);
            }
            self.trim_terminal_candidates(&mut n_term);
        }

        let mut c_term = Vec::new();
        if let Some(first) = self.steps.last() {
            let shift = first.shift(table);
            if first.previous_column == 0
                && first.row == first.previous_row + 1
                && shift.abs() > self.accuracy
                && first.row > 1
            {
                let mut idx = first.row - 2;
                let mut remaining = shift - table.mass(residues[idx]);
                while remaining > -H_MASS - self.accuracy {
                    c_term.push(remaining);
                    if idx == 0 {
                        break;
                    }
                    idx -= 1;
                    remaining -= table.mass(residues[idx]);
                }
                self.trim_terminal_candidates(&mut c_term);
            }
        }

        internal.extend(n_term);
        internal.extend(c_term);
        internal
    }

    /// A walk ending on a hydrogen keeps only that value; a walk ending below
    /// zero drops its last value.
    fn trim_terminal_candidates(&self, candidates: &mut Vec<f64>) {
        let Some(&last) = candidates.last() else {
            return;
        };
        if (last - H_MASS).abs() <= self.accuracy || (-last - H_MASS).abs() <= self.accuracy {
            candidates.clear();
            candidates.push(last);
        } else if last < 0.0 {
            candidates.pop();
        }
    }

    /// Native peaks the alignment relies on, anchors excluded, from the
    /// terminal cell down. A peak used through both its native and its
    /// complementary mass shows up twice.
    pub fn used_peaks(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.steps.len() * 2);
        for step in self.steps.iter() {
            if !step.anchor {
                out.push(step.right_peak);
            }
            if step.previous_column != step.found_column && !step.left_is_anchor {
                out.push(step.left_peak);
            }
        }
        out
    }
}

/// Mass of the residues skipped between the previous row and the step's row.
fn skipped_mass(residues: &[u8], table: &AminoAcidTable, step: &AlignmentStep) -> f64 {
    (step.previous_row + 1..step.row)
        .map(|row| table.mass(residues[row - 1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::refined::RefinedAligner;
    use crate::models::amino_acids::{
        H_PLUS_MASS,
        O_MASS,
    };
    use crate::params::SearchParameters;

    fn ids(sequence: &str) -> Vec<u8> {
        sequence
            .chars()
            .map(|c| AminoAcidTable::id_of(c).unwrap())
            .collect()
    }

    /// b/y ladder with `extra` added to the precursor, without the peaks at `skip`.
    fn ladder(table: &AminoAcidTable, peptide: &str, extra: f64, skip: &[usize]) -> NativeSpectrum {
        let residues = ids(peptide);
        let total: f64 =
            residues.iter().map(|&x| table.mass(x)).sum::<f64>() + 2.0 * H_MASS + O_MASS;
        let mut peaks = Vec::new();
        let mut prefix = 0.0;
        for (i, &aa) in residues.iter().take(residues.len() - 1).enumerate() {
            prefix += table.mass(aa);
            if !skip.contains(&(2 * i)) {
                peaks.push(prefix + H_PLUS_MASS);
            }
            if !skip.contains(&(2 * i + 1)) {
                peaks.push(total - prefix + H_PLUS_MASS);
            }
        }
        NativeSpectrum::new(0, "t".into(), None, total + extra + H_PLUS_MASS, 1, peaks)
    }

    fn align(
        spectrum: &NativeSpectrum,
        protein: &str,
        params: &SearchParameters,
    ) -> (Alignment, Vec<u8>) {
        let table = AminoAcidTable::default();
        let mut residues = ids(protein);
        residues.reverse();
        let mut transformed = TransformedSpectrum::default();
        transformed.rebuild(spectrum, &table, params.accuracy, None, 0.0);
        let mut aligner = RefinedAligner::default();
        let best = aligner
            .align(&transformed, &residues, &table, params)
            .unwrap();
        let location = Location {
            protein_id: 0,
            beginning: 0,
            length: residues.len(),
        };
        let alignment = Alignment::reconstruct(
            best,
            aligner.matrix(),
            &transformed,
            spectrum,
            location,
            &residues,
            &table,
        )
        .unwrap();
        (alignment, residues)
    }

    #[test]
    fn test_full_ladder() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", 0.0, &[]);
        let (alignment, residues) = align(&spectrum, "PEPTIDE", &params);
        assert_eq!(alignment.score, 67);
        assert_eq!(alignment.peaks_in_common, 12);
        assert_eq!(alignment.steps().len(), 7);
        let rendered = alignment.render(&residues, &table);
        assert_eq!(rendered.alignment, "PEPTIDE");
        assert_eq!(rendered.peptide, "PEPTIDE");
        assert!(alignment
            .non_aligned_mass_candidates(&residues, &table)
            .is_empty());
        // One native peak per double column, none used twice
        let mut used = alignment.used_peaks();
        assert_eq!(used.len(), 6);
        used.sort_unstable();
        used.dedup();
        assert_eq!(used.len(), 6);
    }

    #[test]
    fn test_unexplained_mass_is_rendered() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let glycine = table.mass(0);
        let spectrum = ladder(&table, "PEPTIDE", glycine, &[]);
        let (alignment, residues) = align(&spectrum, "PEPTIDE", &params);
        assert!(alignment.score < 67);
        let rendered = alignment.render(&residues, &table);
        assert!(rendered.alignment.contains("[57.02]"), "{}", rendered.alignment);
        assert_eq!(rendered.peptide, "PEPTIDE");
    }

    #[test]
    fn test_internal_shift_is_a_candidate() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", 0.0, &[]);
        let (mut alignment, residues) = align(&spectrum, "PEPTIDE", &params);
        let glycine = table.mass(0);
        let proline = AminoAcidTable::id_of('P').unwrap();
        let step = AlignmentStep {
            row: 7,
            column: 5,
            mass: 100.0 + table.mass(proline) + glycine,
            double: true,
            anchor: false,
            aa: proline,
            right_peak: 3,
            left_peak: 2,
            left_is_anchor: false,
            found_column: 4,
            previous_row: 6,
            previous_column: 4,
            previous_mass: 100.0,
        };
        alignment.steps = vec![step];
        alignment.last_mass = step.mass;
        let candidates = alignment.non_aligned_mass_candidates(&residues, &table);
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0] - glycine).abs() < 1e-9);
        assert_eq!(alignment.render(&residues, &table).alignment, "P[57.02]");
        assert_eq!(alignment.used_peaks(), vec![3]);
    }

    #[test]
    fn test_skipped_residue_is_rendered() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", 0.0, &[]);
        let (mut alignment, residues) = align(&spectrum, "PEPTIDE", &params);
        let glycine = table.mass(0);
        let proline = AminoAcidTable::id_of('P').unwrap();
        // Row 6 holds the E that follows the leading P
        let skipped = table.mass(residues[5]);
        let step = AlignmentStep {
            row: 7,
            column: 5,
            mass: 100.0 + table.mass(proline) + skipped + glycine,
            double: true,
            anchor: false,
            aa: proline,
            right_peak: 3,
            left_peak: 2,
            left_is_anchor: false,
            found_column: 4,
            previous_row: 5,
            previous_column: 4,
            previous_mass: 100.0,
        };
        alignment.steps = vec![step];
        alignment.last_mass = step.mass;
        let rendered = alignment.render(&residues, &table);
        assert_eq!(rendered.alignment, "P[E][57.02]");
        assert_eq!(rendered.peptide, "PE");
    }

    #[test]
    fn test_rank_cmp() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", 0.0, &[]);
        let (a, _) = align(&spectrum, "PEPTIDE", &params);
        let mut b = a.clone();
        b.score -= 1;
        assert_eq!(a.rank_cmp(&b), Ordering::Less);
        assert_eq!(b.rank_cmp(&a), Ordering::Greater);
        let mut c = a.clone();
        c.peaks_in_common -= 1;
        assert_eq!(a.rank_cmp(&c), Ordering::Less);
        assert_eq!(a.rank_cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_trim_terminal_candidates() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", 0.0, &[]);
        let (alignment, _) = align(&spectrum, "PEPTIDE", &params);

        let mut hydrogen = vec![100.0, 30.0, H_MASS + 0.01];
        alignment.trim_terminal_candidates(&mut hydrogen);
        assert_eq!(hydrogen, vec![H_MASS + 0.01]);

        let mut negative = vec![100.0, 30.0, -0.5];
        alignment.trim_terminal_candidates(&mut negative);
        assert_eq!(negative, vec![100.0, 30.0]);

        let mut kept = vec![100.0, 30.0];
        alignment.trim_terminal_candidates(&mut kept);
        assert_eq!(kept, vec![100.0, 30.0]);
    }
}
