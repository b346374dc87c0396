//! # Spectrum transformation
//!
//! A [`TransformedSpectrum`] turns a sorted list of peak masses into the
//! column space the dynamic programming walks:
//!
//! 1. Every peak is paired with its complementary mass
//!    (`precursor - mass + 2 * H+`). When another native peak sits at that mass
//!    the pair is "double"; otherwise the complement is synthesised.
//! 2. Masses outside the open interval between the two anchors (the y0 ion
//!    and the full y ion) are dropped, and the rest is sorted.
//! 3. For every pair of masses whose difference matches a residue, an
//!    [`AaPosition`] is recorded. Only masses where at least one residue ends
//!    become columns. Column 0 is always the N-terminal anchor.
//!
//! The struct doubles as its own scratch arena: rebuilding it for another
//! spectrum (or the same one under a different peak mask) reuses every
//! allocation.

use crate::models::amino_acids::{
    AMINO_ACID_COUNT,
    AminoAcidTable,
    H_PLUS_MASS,
};
use crate::models::spectrum::NativeSpectrum;

/// Which side of a complementary pair a rebuild is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeakChoice {
    #[default]
    Both,
    NativeOnly,
    ComplementOnly,
}

impl PeakChoice {
    #[inline]
    fn keeps_native(self) -> bool {
        self != PeakChoice::ComplementOnly
    }

    #[inline]
    fn keeps_complement(self) -> bool {
        self != PeakChoice::NativeOnly
    }
}

/// Set of residue ids, one bit per residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ResidueSet(u32);

impl ResidueSet {
    pub fn insert(&mut self, id: u8) {
        self.0 |= 1 << id;
    }

    pub fn contains(&self, id: u8) -> bool {
        self.0 & (1 << id) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// What may precede an amino-acid position in an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// The left peak is the N-terminal anchor.
    StartOfSpectrum,
    /// No residue ends on the left peak, so it is not a column.
    NoPredecessor,
    /// Residues ending on the left peak.
    PrecededBy(ResidueSet),
}

impl Condition {
    /// Three-peaks rule: a position whose left peak is a column can only
    /// follow one of the residues that end there.
    #[inline]
    pub fn admits(&self, previous: Option<u8>) -> bool {
        match self {
            Condition::StartOfSpectrum | Condition::NoPredecessor => true,
            Condition::PrecededBy(set) => previous.is_some_and(|x| set.contains(x)),
        }
    }

    /// Whether the left peak of the position is itself a column.
    #[inline]
    pub fn has_left_column(&self) -> bool {
        !matches!(self, Condition::NoPredecessor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AaPosition {
    pub right_column: usize,
    /// Rightmost column a shift may start from: the column just before the
    /// left peak, or the column below it when the left peak is not a column.
    /// `None` when the left peak is the N-terminal anchor.
    pub left_column: Option<usize>,
    /// Native peak indices are 1-based; 0 and `n + 1` are the two anchors.
    pub right_peak: usize,
    pub left_peak: usize,
    pub right_mass: f64,
    pub left_mass: f64,
    pub condition: Condition,
}

impl AaPosition {
    /// Column a plain "found" step extends from.
    #[inline]
    pub fn found_column(&self) -> usize {
        self.left_column.map_or(0, |c| c + 1)
    }
}

#[derive(Debug, Clone, Copy)]
struct ComplementaryPeak {
    mass: f64,
    double: bool,
    native: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TransformedSpectrum {
    spectrum_id: usize,
    accuracy: f64,
    precursor_mass: f64,
    non_aligned_mass: f64,
    first_mass: f64,
    last_mass: f64,
    middle_peak: usize,
    native_peak_count: usize,
    hits: usize,
    peak_mask: Vec<PeakChoice>,
    column_masses: Vec<f64>,
    double_columns: Vec<bool>,
    column_peaks: Vec<usize>,
    positions: [Vec<AaPosition>; AMINO_ACID_COUNT],

    // Scratch, only meaningful during a rebuild
    entries: Vec<ComplementaryPeak>,
    checked: Vec<bool>,
    ending: Vec<ResidueSet>,
    selected: Vec<bool>,
    correspondence: Vec<usize>,
    raw_positions: Vec<(u8, usize, usize)>,
}

impl TransformedSpectrum {
    /// Pre-sizes every buffer for spectra of up to `peaks` native peaks and
    /// `columns` columns, so that rebuilding such spectra never reallocates.
    pub fn reserve(&mut self, peaks: usize, columns: usize) {
        fn grow<T>(buffer: &mut Vec<T>, len: usize) {
            buffer.reserve(len.saturating_sub(buffer.len()));
        }
        // Two anchors plus at most one complement per peak
        let entries = 2 * peaks + 2;
        grow(&mut self.peak_mask, peaks);
        grow(&mut self.checked, peaks);
        grow(&mut self.entries, entries);
        grow(&mut self.ending, entries);
        grow(&mut self.selected, entries);
        grow(&mut self.correspondence, entries);
        grow(&mut self.column_masses, columns);
        grow(&mut self.double_columns, columns);
        grow(&mut self.column_peaks, columns);
    }

    /// Rebuilds the column space for `spectrum`.
    ///
    /// `mask` is indexed by native peak (0-based); missing entries mean
    /// [`PeakChoice::Both`]. `non_aligned_mass` is subtracted from the
    /// precursor mass before complements are computed.
    pub fn rebuild(
        &mut self,
        spectrum: &NativeSpectrum,
        table: &AminoAcidTable,
        accuracy: f64,
        mask: Option<&[PeakChoice]>,
        non_aligned_mass: f64,
    ) {
        let peaks = spectrum.peaks();
        let n = peaks.len();
        self.spectrum_id = spectrum.id;
        self.accuracy = accuracy;
        self.non_aligned_mass = non_aligned_mass;
        self.native_peak_count = n;
        self.precursor_mass = spectrum.precursor_mass(non_aligned_mass);
        self.first_mass = table.first_mass();
        self.last_mass = self.complementary(H_PLUS_MASS);
        self.middle_peak = 0;

        self.peak_mask.clear();
        if let Some(mask) = mask {
            self.peak_mask.extend(mask.iter().take(n).copied());
        }
        self.peak_mask.resize(n, PeakChoice::Both);

        self.pair_peaks(peaks);
        self.entries.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        self.find_positions(table);
        self.build_columns();
    }

    fn pair_peaks(&mut self, peaks: &[f64]) {
        let n = peaks.len();
        self.checked.clear();
        self.checked.resize(n, false);

        // Peaks at or above the last anchor can only produce discarded masses
        let mut top = n;
        while top > 0 && peaks[top - 1] >= self.last_mass {
            self.checked[top - 1] = true;
            top -= 1;
        }
        let mut j = top.saturating_sub(1);

        self.entries.clear();
        self.entries.push(ComplementaryPeak {
            mass: self.first_mass,
            double: false,
            native: 0,
        });
        self.entries.push(ComplementaryPeak {
            mass: self.last_mass,
            double: false,
            native: n + 1,
        });

        for i in 0..n {
            if self.checked[i] {
                continue;
            }
            self.checked[i] = true;
            let native_mass = peaks[i];
            let complementary_mass = self.complementary(native_mass);
            if native_mass < complementary_mass {
                self.middle_peak = i + 1;
            }
            while j > 0
                && (peaks[j] - complementary_mass).abs()
                    > (peaks[j - 1] - complementary_mass).abs()
            {
                j -= 1;
            }

            let choice = self.peak_mask[i];
            let start = self.entries.len();
            let matched = (peaks[j] - complementary_mass).abs() <= self.accuracy;
            if matched && j == i {
                // The peak is its own complement
                self.push_entry(native_mass, false, i + 1);
            } else {
                let double = matched && !self.checked[j];
                if double {
                    self.checked[j] = true;
                }
                if choice.keeps_complement() {
                    self.push_entry(complementary_mass, double, i + 1);
                }
                if choice.keeps_native() {
                    self.push_entry(native_mass, double, i + 1);
                }
            }

            let (low, high) = (self.first_mass, self.last_mass);
            let mut k = start;
            while k < self.entries.len() {
                let mass = self.entries[k].mass;
                if mass <= low || high <= mass {
                    self.entries.remove(k);
                } else {
                    k += 1;
                }
            }
        }
    }

    #[inline]
    fn push_entry(&mut self, mass: f64, double: bool, native: usize) {
        self.entries.push(ComplementaryPeak {
            mass,
            double,
            native,
        });
    }

    fn find_positions(&mut self, table: &AminoAcidTable) {
        let masses = table.masses();
        let lightest = masses.iter().copied().fold(f64::INFINITY, f64::min);
        let heaviest = masses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let m = self.entries.len();

        self.ending.clear();
        self.ending.resize(m, ResidueSet::default());
        self.selected.clear();
        self.selected.resize(m, false);
        self.raw_positions.clear();
        let mut last_right: [Option<usize>; AMINO_ACID_COUNT] = [None; AMINO_ACID_COUNT];

        for j in 1..m {
            let right = self.entries[j].mass;
            for i in 0..j {
                let difference = right - self.entries[i].mass;
                if difference > heaviest + self.accuracy {
                    continue;
                }
                if difference < lightest - self.accuracy {
                    break;
                }
                for (k, aa_mass) in masses.iter().enumerate() {
                    if (difference - aa_mass).abs() <= self.accuracy
                        && last_right[k].is_none_or(|r| r < j)
                    {
                        last_right[k] = Some(j);
                        self.ending[j].insert(k as u8);
                        self.selected[j] = true;
                        self.raw_positions.push((k as u8, j, i));
                    }
                }
            }
        }
        self.hits = self.raw_positions.len();
    }

    fn build_columns(&mut self) {
        let m = self.entries.len();
        self.correspondence.clear();
        self.correspondence.resize(m, 0);
        self.column_masses.clear();
        self.double_columns.clear();
        self.column_peaks.clear();

        self.correspondence[0] = 1;
        self.column_masses.push(self.entries[0].mass);
        self.double_columns.push(false);
        self.column_peaks.push(self.entries[0].native);
        for idx in 1..m {
            if self.selected[idx] {
                self.correspondence[idx] = self.column_masses.len() + 1;
                self.column_masses.push(self.entries[idx].mass);
                self.double_columns.push(self.entries[idx].double);
                self.column_peaks.push(self.entries[idx].native);
            }
        }

        for list in self.positions.iter_mut() {
            list.clear();
        }
        for &(k, j, i) in self.raw_positions.iter() {
            let condition = if i == 0 {
                Condition::StartOfSpectrum
            } else if self.ending[i].is_empty() {
                Condition::NoPredecessor
            } else {
                Condition::PrecededBy(self.ending[i])
            };
            let left_column = if self.correspondence[i] != 0 {
                self.correspondence[i].checked_sub(2)
            } else {
                let mut p = i;
                while self.correspondence[p] == 0 {
                    p -= 1;
                }
                Some(self.correspondence[p] - 1)
            };
            self.positions[k as usize].push(AaPosition {
                right_column: self.correspondence[j] - 1,
                left_column,
                right_peak: self.entries[j].native,
                left_peak: self.entries[i].native,
                right_mass: self.entries[j].mass,
                left_mass: self.entries[i].mass,
                condition,
            });
        }
    }

    /// Complementary mass of `mass` under the current precursor hypothesis.
    #[inline]
    pub fn complementary(&self, mass: f64) -> f64 {
        self.precursor_mass - mass + 2.0 * H_PLUS_MASS
    }

    /// Mass left unexplained between columns `left` and `right` once one
    /// residue of mass `aa_mass` is accounted for.
    #[inline]
    pub fn shift(&self, left: usize, right: usize, aa_mass: f64) -> f64 {
        self.column_masses[right] - aa_mass - self.column_masses[left]
    }

    /// Mass between `column` and the last anchor, 0 when within tolerance.
    pub fn last_shift(&self, column: usize) -> f64 {
        let shift = self.last_mass - self.column_masses[column];
        if shift > self.accuracy { shift } else { 0.0 }
    }

    /// Number of native peaks (0, 1 or 2) observed at `mass` and at its complement.
    pub fn mass_count(&self, spectrum: &NativeSpectrum, mass: f64) -> u32 {
        spectrum.has_peak_near(mass, self.accuracy) as u32
            + spectrum.has_peak_near(self.complementary(mass), self.accuracy) as u32
    }

    pub fn positions(&self, aa: u8) -> &[AaPosition] {
        &self.positions[aa as usize]
    }

    pub fn column_count(&self) -> usize {
        self.column_masses.len()
    }

    pub fn column_mass(&self, column: usize) -> f64 {
        self.column_masses[column]
    }

    pub fn column_masses(&self) -> &[f64] {
        &self.column_masses
    }

    pub fn is_double(&self, column: usize) -> bool {
        self.double_columns[column]
    }

    /// Whether the column is one of the two synthetic anchors.
    pub fn is_anchor(&self, column: usize) -> bool {
        let peak = self.column_peaks[column];
        peak == 0 || peak == self.native_peak_count + 1
    }

    pub fn is_anchor_peak(&self, peak: usize) -> bool {
        peak == 0 || peak > self.native_peak_count
    }

    /// Total number of amino-acid positions recorded.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Largest 1-based native peak index whose mass is below its complement.
    pub fn middle_peak(&self) -> usize {
        self.middle_peak
    }

    pub fn first_mass(&self) -> f64 {
        self.first_mass
    }

    pub fn last_mass(&self) -> f64 {
        self.last_mass
    }

    pub fn precursor_mass(&self) -> f64 {
        self.precursor_mass
    }

    pub fn non_aligned_mass(&self) -> f64 {
        self.non_aligned_mass
    }

    pub fn peak_mask(&self) -> &[PeakChoice] {
        &self.peak_mask
    }

    pub fn native_peak_count(&self) -> usize {
        self.native_peak_count
    }

    pub fn spectrum_id(&self) -> usize {
        self.spectrum_id
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::amino_acids::O_MASS;
    use crate::models::amino_acids::H_MASS;

    const ACC: f64 = 0.02;

    /// b1..b(n-1) and y1..y(n-1) of `peptide`, charge 1.
    fn ladder(table: &AminoAcidTable, peptide: &str) -> (Vec<f64>, f64) {
        let ids: Vec<u8> = peptide.chars().map(|c| AminoAcidTable::id_of(c).unwrap()).collect();
        let water = 2.0 * H_MASS + O_MASS;
        let total: f64 = ids.iter().map(|&x| table.mass(x)).sum::<f64>() + water;
        let mut peaks = Vec::new();
        let mut prefix = 0.0;
        for &id in ids.iter().take(ids.len() - 1) {
            prefix += table.mass(id);
            peaks.push(prefix + H_PLUS_MASS);
            peaks.push(total - prefix + H_PLUS_MASS);
        }
        (peaks, total + H_PLUS_MASS)
    }

    fn spectrum(peaks: Vec<f64>, mz: f64) -> NativeSpectrum {
        NativeSpectrum::new(3, "test".into(), Some(1), mz, 1, peaks)
    }

    #[test]
    fn test_reserved_buffers_are_reused() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let count = peaks.len();
        let s = spectrum(peaks, mz);
        let mut t = TransformedSpectrum::default();
        t.reserve(count, 2 * count + 2);
        let entries = (t.entries.as_ptr(), t.entries.capacity());
        let columns = (t.column_masses.as_ptr(), t.column_masses.capacity());
        assert!(entries.1 >= 2 * count + 2);

        t.rebuild(&s, &table, ACC, None, 0.0);
        t.rebuild(&s, &table, ACC, None, 0.0);
        assert_eq!((t.entries.as_ptr(), t.entries.capacity()), entries);
        assert_eq!(
            (t.column_masses.as_ptr(), t.column_masses.capacity()),
            columns
        );
    }

    #[test]
    fn test_anchor_columns() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let s = spectrum(peaks, mz);
        let mut t = TransformedSpectrum::default();
        t.rebuild(&s, &table, ACC, None, 0.0);

        assert_eq!(t.spectrum_id(), 3);
        assert!((t.column_mass(0) - table.first_mass()).abs() < 1e-9);
        assert!(t.is_anchor(0));
        let last = t.column_count() - 1;
        assert!((t.column_mass(last) - mz).abs() < 1e-9);
        assert!(t.is_anchor(last));
        assert!(t.column_masses().windows(2).all(|w| w[0] < w[1]));
        // Every ladder peak has its complement in the spectrum
        for c in 1..last {
            assert!(t.is_double(c));
        }
        assert!(t.hits() >= 12);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let table = AminoAcidTable::default();
        let (mut peaks, mz) = ladder(&table, "SAMPLER");
        peaks.push(333.33);
        let s = spectrum(peaks, mz);
        let mut a = TransformedSpectrum::default();
        let mut b = TransformedSpectrum::default();
        a.rebuild(&s, &table, ACC, None, 0.0);
        b.rebuild(&s, &table, ACC, Some(&[]), 0.0);
        b.rebuild(&s, &table, ACC, None, 0.0);
        assert_eq!(a.column_masses(), b.column_masses());
        assert_eq!(a.double_columns, b.double_columns);
        for aa in 0..AMINO_ACID_COUNT as u8 {
            assert_eq!(a.positions(aa), b.positions(aa));
        }
    }

    #[test]
    fn test_complements_are_kept() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        // Drop y3, leaving b4 without its partner
        let b4 = peaks[6];
        let y3 = peaks[7];
        let kept: Vec<f64> = peaks.iter().copied().filter(|&x| x != y3).collect();
        let s = spectrum(kept, mz);
        let mut t = TransformedSpectrum::default();
        t.rebuild(&s, &table, ACC, None, 0.0);

        let complement = t.complementary(b4);
        assert!((complement - y3).abs() < 1e-6);
        let column = t
            .column_masses()
            .iter()
            .position(|&m| (m - complement).abs() < 1e-9)
            .expect("synthesised complement is a column");
        assert!(!t.is_double(column));
    }

    #[test]
    fn test_peak_mask_removes_one_side() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let s = spectrum(peaks, mz);
        let mut full = TransformedSpectrum::default();
        full.rebuild(&s, &table, ACC, None, 0.0);

        // The lightest peak (b1) pairs with y6: keeping only the native side drops y6
        let y6 = full.complementary(s.peaks()[0]);
        let mut mask = vec![PeakChoice::Both; s.len()];
        mask[0] = PeakChoice::NativeOnly;
        let mut masked = TransformedSpectrum::default();
        masked.rebuild(&s, &table, ACC, Some(&mask), 0.0);
        assert!(!masked.column_masses().iter().any(|&m| (m - y6).abs() < 1e-6));
        assert!(full.column_masses().iter().any(|&m| (m - y6).abs() < 1e-6));
        assert_eq!(masked.peak_mask()[0], PeakChoice::NativeOnly);
    }

    #[test]
    fn test_positions_and_conditions() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let s = spectrum(peaks, mz);
        let mut t = TransformedSpectrum::default();
        t.rebuild(&s, &table, ACC, None, 0.0);

        let e = AminoAcidTable::id_of('E').unwrap();
        let d = AminoAcidTable::id_of('D').unwrap();
        // y1 - y0 is the C-terminal E: starts at the anchor
        let start = t
            .positions(e)
            .iter()
            .find(|p| p.left_peak == 0)
            .expect("E from the anchor");
        assert_eq!(start.condition, Condition::StartOfSpectrum);
        assert_eq!(start.left_column, None);
        assert_eq!(start.found_column(), 0);
        // y2 - y1 is D, preceded by E
        let next = t
            .positions(d)
            .iter()
            .find(|p| p.left_column == Some(start.right_column - 1))
            .expect("D after E");
        assert!(next.condition.admits(Some(e)));
        assert!(!next.condition.admits(Some(d)));
        assert!(!next.condition.admits(None));
        assert_eq!(next.found_column(), start.right_column);
        for aa in 0..AMINO_ACID_COUNT as u8 {
            assert!(t.positions(aa).windows(2).all(|w| w[0].right_column < w[1].right_column));
        }
    }

    #[test]
    fn test_shifts() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let s = spectrum(peaks, mz);
        let mut t = TransformedSpectrum::default();
        t.rebuild(&s, &table, ACC, Some(&[]), 57.021464);
        assert!((t.non_aligned_mass() - 57.021464).abs() < 1e-12);
        assert!((t.last_mass() - (mz - 57.021464)).abs() < 1e-9);
        assert!((t.last_shift(0) - (t.last_mass() - t.first_mass())).abs() < 1e-9);
        let g = table.mass(0);
        assert!((t.shift(0, 0, g) + g).abs() < 1e-12);
    }

    #[test]
    fn test_mass_count() {
        let table = AminoAcidTable::default();
        let (peaks, mz) = ladder(&table, "PEPTIDE");
        let s = spectrum(peaks.clone(), mz);
        let mut t = TransformedSpectrum::default();
        t.rebuild(&s, &table, ACC, None, 0.0);
        assert_eq!(t.mass_count(&s, peaks[0]), 2);
        assert_eq!(t.mass_count(&s, 1234.5), 0);
    }

    #[test]
    fn test_condition_admits() {
        let mut set = ResidueSet::default();
        set.insert(3);
        assert!(Condition::StartOfSpectrum.admits(None));
        assert!(Condition::NoPredecessor.admits(Some(1)));
        assert!(Condition::PrecededBy(set).admits(Some(3)));
        assert!(!Condition::PrecededBy(set).admits(Some(4)));
        assert!(!Condition::NoPredecessor.has_left_column());
        assert!(Condition::StartOfSpectrum.has_left_column());
    }
}
