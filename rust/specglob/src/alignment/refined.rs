use super::{
    carried,
    realign_from_first,
    realigns_from,
    ResidueMasses,
};
use crate::models::amino_acids::AminoAcidTable;
use crate::params::{
    ScoreTable,
    SearchParameters,
};
use crate::transform::{
    AaPosition,
    TransformedSpectrum,
};

/// Reference to an amino-acid position of the transformed spectrum the
/// matrix was filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRef {
    pub aa: u8,
    pub index: u32,
}

/// Back-pointer of one cell of the refined matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scenario {
    pub previous_row: usize,
    pub previous_column: usize,
    pub position: Option<PositionRef>,
}

/// Row-major back-pointer matrix, reused across candidates. The backing
/// storage only ever grows.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMatrix {
    cells: Vec<Scenario>,
    width: usize,
    height: usize,
}

impl ScenarioMatrix {
    /// Prepares the matrix for `height` rows and `width` columns. Row 0 is
    /// cleared; other rows keep stale entries that are overwritten before
    /// being read.
    pub fn reset(&mut self, height: usize, width: usize) {
        let needed = height * width;
        if needed > self.cells.len() {
            self.cells.resize(needed, Scenario::default());
        }
        self.width = width;
        self.height = height;
        self.cells[..width].fill(Scenario::default());
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> Option<&Scenario> {
        if row >= self.height || column >= self.width {
            return None;
        }
        self.cells.get(row * self.width + column)
    }

    #[inline]
    fn set(&mut self, row: usize, column: usize, scenario: Scenario) {
        self.cells[row * self.width + column] = scenario;
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.cells.len()
    }
}

/// Best cell found by a refined pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BestCell {
    pub row: usize,
    pub column: usize,
    pub score: i32,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    row: usize,
    score: i32,
}

/// Per-worker state of the refined pass.
#[derive(Debug, Clone, Default)]
pub struct RefinedAligner {
    cells: Vec<Cell>,
    pending: Vec<(usize, i32)>,
    masses: ResidueMasses,
    matrix: ScenarioMatrix,
}

impl RefinedAligner {
    /// Pre-sizes the per-column state for spectra of up to `columns` columns.
    /// The back-pointer matrix still grows with the locations it sees.
    pub fn reserve(&mut self, residues: usize, columns: usize) {
        self.cells.reserve(columns.saturating_sub(self.cells.len()));
        self.masses.reserve(residues);
    }

    /// Aligns `residues` (a location, C-terminus first) against `transformed`
    /// with the post-processing scores. Returns the best cell whose score
    /// beats the minimum scenario score, if any.
    pub fn align(
        &mut self,
        transformed: &TransformedSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
    ) -> Option<BestCell> {
        let scores = &params.post_scores;
        let accuracy = transformed.accuracy();
        let columns = transformed.column_count();
        let realignment = params.realignment_enabled();

        self.cells.clear();
        self.cells.push(Cell { row: 0, score: 0 });
        self.cells.resize(
            columns,
            Cell {
                row: 0,
                score: scores.initialization(),
            },
        );
        self.masses.fill(residues, table);
        self.matrix.reset(residues.len() + 1, columns);

        let mut best: Option<BestCell> = None;
        let mut best_score = params.min_scenario_score;
        let mut previous: Option<u8> = None;
        for (idx, &aa) in residues.iter().enumerate() {
            let row = idx + 1;
            let aa_mass = table.mass(aa);
            self.cells[0] = Cell {
                row: row - 1,
                score: 0,
            };
            self.pending.clear();

            for (index, position) in transformed.positions(aa).iter().enumerate() {
                if !params.disable_three_peaks && !position.condition.admits(previous) {
                    continue;
                }
                let step = self.score_position(
                    transformed,
                    position,
                    row,
                    aa_mass,
                    scores,
                    accuracy,
                    realignment,
                );
                if let Some((score, previous_row, previous_column)) = step {
                    let right = position.right_column;
                    self.pending.push((right, score));
                    self.matrix.set(
                        row,
                        right,
                        Scenario {
                            previous_row,
                            previous_column,
                            position: Some(PositionRef {
                                aa,
                                index: index as u32,
                            }),
                        },
                    );
                }
            }

            for &(column, score) in self.pending.iter() {
                self.cells[column] = Cell { row, score };
                if score > best_score {
                    best_score = score;
                    best = Some(BestCell { row, column, score });
                }
            }
            previous = Some(aa);
        }
        best
    }

    /// Best transition into the right column of `position`, as
    /// `(score, previous_row, previous_column)`. `None` when carrying the
    /// column's own score down is at least as good.
    #[allow(clippy::too_many_arguments)]
    fn score_position(
        &self,
        transformed: &TransformedSpectrum,
        position: &AaPosition,
        row: usize,
        aa_mass: f64,
        scores: &ScoreTable,
        accuracy: f64,
        realignment: bool,
    ) -> Option<(i32, usize, usize)> {
        let right = position.right_column;
        let (found, with_shift) = scores.column_scores(transformed.is_double(right));
        let not_found = scores.not_found;

        let cell = self.cells[right];
        let mut best_score = carried(cell.score, cell.row, row, not_found);
        let mut best_column = right;
        let mut realigned = 0;

        if position.condition.has_left_column() {
            let column = position.found_column();
            let cell = self.cells[column];
            let score = if cell.row < row - 1 {
                carried(cell.score, cell.row, row - 1, not_found) + with_shift
            } else {
                cell.score + found
            };
            if score >= best_score {
                best_score = score;
                best_column = column;
            }
        }

        if let Some(left) = position.left_column {
            for column in 1..=left {
                let cell = self.cells[column];
                let shift = transformed.shift(column, right, aa_mass);
                let score = if realignment
                    && realigns_from(&self.masses, row, cell.row, shift, accuracy, None)
                {
                    cell.score + found
                } else {
                    carried(cell.score, cell.row, row - 1, not_found) + with_shift
                };
                if score > best_score {
                    best_score = score;
                    best_column = column;
                }
            }

            if found > best_score {
                let shift = transformed.shift(0, right, aa_mass);
                let restart = if realignment {
                    realign_from_first(&self.masses, row, shift, accuracy, None)
                } else {
                    None
                };
                match restart {
                    Some(len) => {
                        best_score = found;
                        best_column = 0;
                        realigned = len;
                    }
                    None if with_shift > best_score => {
                        best_score = with_shift;
                        best_column = 0;
                    }
                    None => {}
                }
            }
        }

        if best_column == right {
            return None;
        }
        let previous_row = if best_column == 0 {
            row - 1 - realigned
        } else {
            self.cells[best_column].row
        };
        Some((best_score, previous_row, best_column))
    }

    pub fn matrix(&self) -> &ScenarioMatrix {
        &self.matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::spectrum::NativeSpectrum;
    use crate::models::amino_acids::{
        H_MASS,
        H_PLUS_MASS,
        O_MASS,
    };

    fn ids(sequence: &str) -> Vec<u8> {
        sequence
            .chars()
            .map(|c| AminoAcidTable::id_of(c).unwrap())
            .collect()
    }

    fn ladder(table: &AminoAcidTable, peptide: &str, skip: &[usize]) -> NativeSpectrum {
        let residues = ids(peptide);
        let total: f64 =
            residues.iter().map(|&x| table.mass(x)).sum::<f64>() + 2.0 * H_MASS + O_MASS;
        let mut peaks = Vec::new();
        let mut prefix = 0.0;
        for (i, &aa) in residues.iter().take(residues.len() - 1).enumerate() {
            prefix += table.mass(aa);
            let b = prefix + H_PLUS_MASS;
            let y = total - prefix + H_PLUS_MASS;
            // Peaks are numbered b1, y(n-1), b2, y(n-2), ...
            if !skip.contains(&(2 * i)) {
                peaks.push(b);
            }
            if !skip.contains(&(2 * i + 1)) {
                peaks.push(y);
            }
        }
        NativeSpectrum::new(0, "t".into(), None, total + H_PLUS_MASS, 1, peaks)
    }

    fn reversed(sequence: &str) -> Vec<u8> {
        let mut out = ids(sequence);
        out.reverse();
        out
    }

    #[test]
    fn test_full_ladder() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", &[]);
        let mut transformed = TransformedSpectrum::default();
        transformed.rebuild(&spectrum, &table, params.accuracy, None, 0.0);

        let mut aligner = RefinedAligner::default();
        let best = aligner
            .align(&transformed, &reversed("PEPTIDE"), &table, &params)
            .unwrap();
        // Six double columns and the single last anchor
        assert_eq!(best.score, 6 * 10 + 7);
        assert_eq!(best.row, 7);
        assert_eq!(best.column, transformed.column_count() - 1);

        // Back-pointers walk the diagonal down to column 0
        let (mut row, mut column) = (best.row, best.column);
        let mut steps = 0;
        while column != 0 {
            let scenario = aligner.matrix().get(row, column).unwrap();
            assert!(scenario.position.is_some());
            assert_eq!(scenario.previous_row, row - 1);
            row = scenario.previous_row;
            column = scenario.previous_column;
            steps += 1;
        }
        assert_eq!(steps, 7);
        assert_eq!(row, 0);
    }

    #[test]
    fn test_missing_peak_lowers_score() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let full = ladder(&table, "PEPTIDE", &[]);
        // Remove y3: its column survives as the complement of b4
        let partial = ladder(&table, "PEPTIDE", &[7]);
        let mut transformed = TransformedSpectrum::default();
        let mut aligner = RefinedAligner::default();
        let residues = reversed("PEPTIDE");

        transformed.rebuild(&full, &table, params.accuracy, None, 0.0);
        let full_score = aligner.align(&transformed, &residues, &table, &params).unwrap().score;
        transformed.rebuild(&partial, &table, params.accuracy, None, 0.0);
        let partial_score = aligner.align(&transformed, &residues, &table, &params).unwrap().score;
        assert_eq!(partial_score, 5 * 10 + 7 + 7);
        assert!(partial_score < full_score);
    }

    #[test]
    fn test_nothing_above_minimum() {
        let table = AminoAcidTable::default();
        let params = SearchParameters::default();
        let spectrum = ladder(&table, "PEPTIDE", &[]);
        let mut transformed = TransformedSpectrum::default();
        transformed.rebuild(&spectrum, &table, params.accuracy, None, 0.0);
        let mut aligner = RefinedAligner::default();
        assert!(aligner
            .align(&transformed, &reversed("WWWW"), &table, &params)
            .is_none());
    }

    #[test]
    fn test_matrix_reset_grows() {
        let mut matrix = ScenarioMatrix::default();
        matrix.reset(3, 4);
        assert_eq!(matrix.capacity(), 12);
        matrix.set(
            2,
            3,
            Scenario {
                previous_row: 1,
                previous_column: 2,
                position: None,
            },
        );
        assert_eq!(matrix.get(2, 3).unwrap().previous_row, 1);
        matrix.reset(2, 2);
        assert_eq!(matrix.capacity(), 12);
        assert!(matrix.get(2, 0).is_none());
        assert_eq!(matrix.get(0, 1), Some(&Scenario::default()));
    }
}
