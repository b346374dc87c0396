use super::candidate_heap::CandidateHeap;
use super::{
    carried,
    realign_from_first,
    realigns_from,
    ResidueMasses,
};
use crate::models::amino_acids::{
    AminoAcidTable,
    SMALLEST_MASS,
};
use crate::models::protein::ProteinDatabase;
use crate::params::{
    CoarseStrategy,
    SearchParameters,
};
use crate::transform::{
    AaPosition,
    TransformedSpectrum,
};

/// Interest cell: the last row a column was written at, with the tree the
/// score belongs to and the row that tree's location starts at.
#[derive(Debug, Clone, Copy)]
struct Cell {
    row: usize,
    score: i32,
    tree: Option<usize>,
    beginning: i64,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    column: usize,
    score: i32,
    tree: usize,
    beginning: i64,
}

/// Outcome of scoring one amino-acid position.
#[derive(Debug, Clone, Copy)]
struct Choice {
    score: i32,
    column: usize,
    realigned: usize,
}

/// Running best shift column of a row, scanned incrementally as left
/// columns grow.
#[derive(Debug, Clone, Copy)]
struct ShiftScan {
    last_column: Option<usize>,
    best_score: i32,
    best_column: Option<usize>,
}

impl ShiftScan {
    fn new() -> Self {
        Self {
            last_column: None,
            best_score: -1,
            best_column: None,
        }
    }
}

/// Scores applied by the coarse pass for one position.
#[derive(Debug, Clone, Copy)]
struct StepScores {
    found: i32,
    with_shift: i32,
    not_found: i32,
}

/// Per-worker state of the coarse pass over the whole protein database.
#[derive(Debug, Clone, Default)]
pub struct CoarseScanner {
    cells: Vec<Cell>,
    pending: Vec<Pending>,
    masses: ResidueMasses,
}

impl CoarseScanner {
    /// Pre-sizes the scratch for proteins of up to `residues` residues and
    /// spectra of up to `columns` columns.
    pub fn reserve(&mut self, residues: usize, columns: usize) {
        self.cells.reserve(columns.saturating_sub(self.cells.len()));
        self.masses.reserve(residues);
    }

    /// Scans every protein and offers the best local alignments to `heap`,
    /// which must have been prepared for the spectrum.
    pub fn scan(
        &mut self,
        transformed: &TransformedSpectrum,
        proteins: &ProteinDatabase,
        table: &AminoAcidTable,
        params: &SearchParameters,
        heap: &mut CandidateHeap,
    ) {
        let mut min_score = params.min_scenario_score;
        for (protein_id, protein) in proteins.proteins().iter().enumerate() {
            heap.begin_protein(protein_id);
            min_score = self.scan_protein(
                transformed,
                protein.residues(),
                table,
                params,
                heap,
                min_score,
            );
        }
    }

    fn scan_protein(
        &mut self,
        transformed: &TransformedSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
        heap: &mut CandidateHeap,
        mut min_score: i32,
    ) -> i32 {
        let scores = &params.main_scores;
        let columns = transformed.column_count();
        let surplus = params.surplus as i64;

        self.cells.clear();
        self.cells.push(Cell {
            row: 0,
            score: 0,
            tree: None,
            beginning: 0,
        });
        self.cells.resize(
            columns,
            Cell {
                row: 0,
                score: scores.initialization(),
                tree: None,
                beginning: 0,
            },
        );
        self.masses.fill(residues, table);

        let mut previous: Option<u8> = None;
        for (idx, &aa) in residues.iter().enumerate() {
            let row = idx + 1;
            let aa_mass = table.mass(aa);
            self.cells[0].row = row - 1;
            self.pending.clear();
            let mut scan = ShiftScan::new();

            for position in transformed.positions(aa) {
                if !params.disable_three_peaks && !position.condition.admits(previous) {
                    continue;
                }
                let right = position.right_column;
                let (found, with_shift) = scores.column_scores(transformed.is_double(right));
                let step = StepScores {
                    found,
                    with_shift,
                    not_found: scores.not_found,
                };
                let choice = match params.coarse_strategy {
                    CoarseStrategy::FirstColumnFastPath => self.first_column_fast_path(
                        transformed,
                        position,
                        row,
                        aa_mass,
                        step,
                        params,
                        &mut scan,
                    ),
                    CoarseStrategy::ExhaustiveShift => {
                        self.exhaustive_shift(transformed, position, row, aa_mass, step, params)
                    }
                };
                if choice.column == right {
                    continue;
                }

                let source = self.cells[choice.column];
                let (tree, beginning) = match source.tree {
                    Some(tree) if choice.column != 0 => (tree, source.beginning),
                    _ => {
                        let shift = transformed.shift(0, right, aa_mass);
                        let beginning = row as i64
                            - choice.realigned as i64
                            - surplus
                            - (shift / SMALLEST_MASS) as i64;
                        (heap.open_tree(), beginning)
                    }
                };
                self.pending.push(Pending {
                    column: right,
                    score: choice.score,
                    tree,
                    beginning,
                });
            }

            for pending in self.pending.iter() {
                self.cells[pending.column] = Cell {
                    row,
                    score: pending.score,
                    tree: Some(pending.tree),
                    beginning: pending.beginning,
                };
                if pending.score > min_score {
                    let end = row as i64
                        + surplus
                        + (transformed.last_shift(pending.column) / SMALLEST_MASS) as i64;
                    min_score =
                        heap.try_add(pending.beginning, end, pending.score, pending.tree);
                }
            }
            previous = Some(aa);
        }
        min_score
    }

    /// Not-found and found cases shared by both strategies.
    fn direct_choice(&self, position: &AaPosition, row: usize, step: StepScores) -> Choice {
        let right = position.right_column;
        let cell = self.cells[right];
        let mut choice = Choice {
            score: carried(cell.score, cell.row, row, step.not_found),
            column: right,
            realigned: 0,
        };
        if position.condition.has_left_column() {
            let column = position.found_column();
            let cell = self.cells[column];
            let score = if cell.row < row - 1 {
                carried(cell.score, cell.row, row - 1, step.not_found) + step.with_shift
            } else {
                cell.score + step.found
            };
            if score >= choice.score {
                choice.score = score;
                choice.column = column;
            }
        }
        choice
    }

    /// Tries a realignment from column 0 first, then a single shift from the
    /// best column left of the position.
    #[allow(clippy::too_many_arguments)]
    fn first_column_fast_path(
        &self,
        transformed: &TransformedSpectrum,
        position: &AaPosition,
        row: usize,
        aa_mass: f64,
        step: StepScores,
        params: &SearchParameters,
        scan: &mut ShiftScan,
    ) -> Choice {
        let mut choice = self.direct_choice(position, row, step);
        let Some(left) = position.left_column else {
            return choice;
        };
        let right = position.right_column;
        let accuracy = transformed.accuracy();

        if scan.last_column.is_some_and(|c| left < c) {
            *scan = ShiftScan::new();
        }
        let from = scan.last_column.map_or(0, |c| c + 1);
        for column in from..=left {
            let cell = self.cells[column];
            let score = carried(cell.score, cell.row, row - 1, step.not_found);
            if score > scan.best_score {
                scan.best_score = score;
                scan.best_column = Some(column);
            }
        }
        scan.last_column = Some(left);

        if params.first_column_realignment_enabled() && step.found > choice.score {
            let shift = transformed.shift(0, right, aa_mass);
            let cap = Some(params.max_realignment_size_first_column);
            if let Some(len) = realign_from_first(&self.masses, row, shift, accuracy, cap) {
                choice = Choice {
                    score: step.found,
                    column: 0,
                    realigned: len,
                };
            }
        }

        if params.realignment_enabled() {
            match scan.best_column.filter(|&c| c != 0) {
                Some(column) => {
                    let cell = self.cells[column];
                    let shift = transformed.shift(column, right, aa_mass);
                    let cap = Some(params.max_realignment_size);
                    let score = if realigns_from(&self.masses, row, cell.row, shift, accuracy, cap)
                    {
                        cell.score + step.found
                    } else {
                        scan.best_score + step.with_shift
                    };
                    if score > choice.score {
                        choice = Choice {
                            score,
                            column,
                            realigned: 0,
                        };
                    }
                }
                None => {
                    if step.with_shift > choice.score {
                        choice = Choice {
                            score: step.with_shift,
                            column: 0,
                            realigned: 0,
                        };
                    }
                }
            }
        } else if let Some(column) = scan.best_column {
            if scan.best_score + step.with_shift > choice.score {
                choice = Choice {
                    score: scan.best_score + step.with_shift,
                    column,
                    realigned: 0,
                };
            }
        }
        choice
    }

    /// Tries a realignment or a shift from every column left of the position,
    /// then from column 0.
    fn exhaustive_shift(
        &self,
        transformed: &TransformedSpectrum,
        position: &AaPosition,
        row: usize,
        aa_mass: f64,
        step: StepScores,
        params: &SearchParameters,
    ) -> Choice {
        let mut choice = self.direct_choice(position, row, step);
        let Some(left) = position.left_column else {
            return choice;
        };
        let right = position.right_column;
        let accuracy = transformed.accuracy();
        let cap = params
            .realignment_enabled()
            .then_some(params.max_realignment_size);

        for column in 1..=left {
            let cell = self.cells[column];
            let shift = transformed.shift(column, right, aa_mass);
            let realigns = cap.is_some()
                && realigns_from(&self.masses, row, cell.row, shift, accuracy, cap);
            let score = if realigns {
                cell.score + step.found
            } else {
                carried(cell.score, cell.row, row - 1, step.not_found) + step.with_shift
            };
            if score > choice.score {
                choice = Choice {
                    score,
                    column,
                    realigned: 0,
                };
            }
        }

        if step.found > choice.score {
            let shift = transformed.shift(0, right, aa_mass);
            let restart = match cap {
                Some(_) => realign_from_first(&self.masses, row, shift, accuracy, cap),
                None => None,
            };
            match restart {
                Some(len) => {
                    choice = Choice {
                        score: step.found,
                        column: 0,
                        realigned: len,
                    };
                }
                None if step.with_shift > choice.score => {
                    choice = Choice {
                        score: step.with_shift,
                        column: 0,
                        realigned: 0,
                    };
                }
                None => {}
            }
        }
        choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::amino_acids::{
        H_MASS,
        H_PLUS_MASS,
        O_MASS,
    };
    use crate::models::protein::Protein;
    use crate::models::spectrum::NativeSpectrum;

    fn ladder(table: &AminoAcidTable, peptide: &str) -> NativeSpectrum {
        let residues: Vec<u8> = peptide
            .chars()
            .map(|c| AminoAcidTable::id_of(c).unwrap())
            .collect();
        let total: f64 =
            residues.iter().map(|&x| table.mass(x)).sum::<f64>() + 2.0 * H_MASS + O_MASS;
        let mut peaks = Vec::new();
        let mut prefix = 0.0;
        for &aa in residues.iter().take(residues.len() - 1) {
            prefix += table.mass(aa);
            peaks.push(prefix + H_PLUS_MASS);
            peaks.push(total - prefix + H_PLUS_MASS);
        }
        NativeSpectrum::new(0, "t".into(), None, total + H_PLUS_MASS, 1, peaks)
    }

    fn database() -> ProteinDatabase {
        ProteinDatabase::new(vec![
            Protein::new("decoy".into(), "decoy".into(), "WWKRWWHHMMWW".into()),
            Protein::new("target".into(), "target".into(), "MKLPEPTIDEGGR".into()),
        ])
    }

    fn scan(strategy: CoarseStrategy) -> Vec<crate::models::Candidate> {
        let table = AminoAcidTable::default();
        let params = SearchParameters {
            coarse_strategy: strategy,
            locations_saved: 3,
            ..Default::default()
        };
        let spectrum = ladder(&table, "PEPTIDE");
        let mut transformed = TransformedSpectrum::default();
        transformed.rebuild(&spectrum, &table, params.accuracy, None, 0.0);

        let mut heap = CandidateHeap::new(params.locations_saved, params.min_scenario_score);
        heap.begin_spectrum(0, params.min_scenario_score);
        let mut scanner = CoarseScanner::default();
        scanner.scan(&transformed, &database(), &table, &params, &mut heap);
        heap.drain_locations(params.locations_score_threshold)
    }

    #[test]
    fn test_fast_path_finds_target() {
        let kept = scan(CoarseStrategy::FirstColumnFastPath);
        let best = kept[0];
        assert_eq!(best.protein_id, Some(1));
        assert_eq!(best.score, 67);
        // Reversed target is RGGEDITPEPLKM; PEPTIDE covers rows 4 to 10
        assert!(best.start_row <= 4);
        assert!(best.end_row >= 10);
    }

    #[test]
    fn test_exhaustive_finds_target() {
        let kept = scan(CoarseStrategy::ExhaustiveShift);
        assert_eq!(kept[0].protein_id, Some(1));
        assert_eq!(kept[0].score, 67);
    }
}
