//! Search configuration.
//!
//! [`SearchParameters`] is built once (from JSON, the legacy `key = value`
//! file, or [`Default`]), validated, and then shared read-only by every
//! component for the whole run.

use crate::errors::{
    Result,
    SpecGlobError,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;

/// Integer scores of one dynamic-programming pass.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScoreTable {
    /// Residue explained by a double (complement-confirmed) column.
    pub certainly_found: i32,
    /// Residue explained by a single column.
    pub found: i32,
    /// Residue reached through a mass shift, landing on a double column.
    pub certainly_found_with_shift: i32,
    /// Residue reached through a mass shift, landing on a single column.
    pub found_with_shift: i32,
    /// Penalty per residue skipped without spectral evidence.
    pub not_found: i32,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            certainly_found: 10,
            found: 7,
            certainly_found_with_shift: -6,
            found_with_shift: -8,
            not_found: -4,
        }
    }
}

impl ScoreTable {
    /// Score every column starts from before anything is aligned on it.
    pub fn initialization(&self) -> i32 {
        self.found_with_shift - self.certainly_found - 1
    }

    /// `(found, found_with_shift)` for a column, depending on whether it is double.
    #[inline]
    pub fn column_scores(&self, double: bool) -> (i32, i32) {
        if double {
            (self.certainly_found, self.certainly_found_with_shift)
        } else {
            (self.found, self.found_with_shift)
        }
    }
}

/// Variant of the coarse pass scanning every protein.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoarseStrategy {
    /// Realignment from column 0 first, then from the single best shift column.
    #[default]
    #[serde(rename = "first_column_fast_path")]
    FirstColumnFastPath,
    /// Realignment and shift tried from every column to the left.
    #[serde(rename = "exhaustive_shift")]
    ExhaustiveShift,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum PeakFilter {
    #[serde(rename = "most_intense")]
    MostIntense { count: usize },
    #[serde(rename = "keep_all")]
    KeepAll,
}

impl Default for PeakFilter {
    fn default() -> Self {
        PeakFilter::MostIntense { count: 60 }
    }
}

/// Fixed modifications, in Daltons, added to residue and terminal masses.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Modifications {
    #[serde(default)]
    pub residues: BTreeMap<char, f64>,
    #[serde(default)]
    pub n_term: f64,
    #[serde(default)]
    pub c_term: f64,
}

impl Modifications {
    pub fn residue(&self, letter: char) -> f64 {
        self.residues.get(&letter).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SearchParameters {
    /// Mass tolerance, in Daltons, for every peak comparison.
    pub accuracy: f64,
    /// Spectra with fewer peaks are dropped at load.
    pub min_peaks: usize,
    /// Spectra with fewer amino-acid positions are not searched.
    pub min_amino_acid_hits: usize,
    pub peak_filter: PeakFilter,
    pub threads: usize,
    pub max_realignment_size: usize,
    pub max_realignment_size_first_column: usize,
    /// Extra rows added on both sides of a coarse location.
    pub surplus: usize,
    pub coarse_strategy: CoarseStrategy,
    pub disable_three_peaks: bool,
    pub disable_peak_cleaning: bool,
    pub disable_non_aligned_mass: bool,
    /// Spectra processed between two flushes of the results file.
    pub batch_size: usize,
    pub locations_saved: usize,
    pub interpretations_saved: usize,
    pub min_scenario_score: i32,
    pub locations_score_threshold: f64,
    pub max_redundant_groups: usize,
    pub main_scores: ScoreTable,
    pub post_scores: ScoreTable,
    pub modifications: Modifications,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            accuracy: 0.02,
            min_peaks: 10,
            min_amino_acid_hits: 10,
            peak_filter: PeakFilter::default(),
            threads: 1,
            max_realignment_size: 4,
            max_realignment_size_first_column: 4,
            surplus: 5,
            coarse_strategy: CoarseStrategy::default(),
            disable_three_peaks: false,
            disable_peak_cleaning: false,
            disable_non_aligned_mass: false,
            batch_size: 500,
            locations_saved: 1,
            interpretations_saved: 1,
            min_scenario_score: 10,
            locations_score_threshold: 0.5,
            max_redundant_groups: 10,
            main_scores: ScoreTable::default(),
            post_scores: ScoreTable::default(),
            modifications: Modifications::default(),
        }
    }
}

impl SearchParameters {
    /// Checks the parameters and applies the normalisations the search relies on.
    pub fn validate(mut self) -> Result<Self> {
        if !(self.accuracy.is_finite() && self.accuracy > 0.0) {
            return Err(SpecGlobError::config(format!(
                "accuracy must be a positive number, got {}",
                self.accuracy
            )));
        }
        if self.batch_size == 0 {
            return Err(SpecGlobError::config("batch_size must be at least 1"));
        }
        if self.locations_saved == 0 {
            return Err(SpecGlobError::config("locations_saved must be at least 1"));
        }
        if self.interpretations_saved == 0 {
            return Err(SpecGlobError::config(
                "interpretations_saved must be at least 1",
            ));
        }
        if let PeakFilter::MostIntense { count: 0 } = self.peak_filter {
            return Err(SpecGlobError::config(
                "the most intense peak filter must keep at least one peak",
            ));
        }
        if !(0.0..=1.0).contains(&self.locations_score_threshold) {
            return Err(SpecGlobError::config(format!(
                "locations_score_threshold must be within [0, 1], got {}",
                self.locations_score_threshold
            )));
        }
        for letter in self.modifications.residues.keys() {
            if crate::models::AminoAcidTable::id_of(*letter).is_none() {
                return Err(SpecGlobError::config(format!(
                    "modification on unknown residue '{}'",
                    letter
                )));
            }
        }
        self.threads = self.threads.clamp(1, self.batch_size);
        self.min_scenario_score = self.min_scenario_score.max(0);
        self.interpretations_saved = self.interpretations_saved.min(self.locations_saved);
        Ok(self)
    }

    pub fn realignment_enabled(&self) -> bool {
        self.max_realignment_size >= 2
    }

    pub fn first_column_realignment_enabled(&self) -> bool {
        self.max_realignment_size_first_column >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_score() {
        let table = ScoreTable::default();
        assert_eq!(table.initialization(), -19);
        assert_eq!(table.column_scores(true), (10, -6));
        assert_eq!(table.column_scores(false), (7, -8));
    }

    #[test]
    fn test_validate_normalises() {
        let params = SearchParameters {
            threads: 64,
            batch_size: 8,
            min_scenario_score: -3,
            locations_saved: 2,
            interpretations_saved: 5,
            ..Default::default()
        };
        let params = params.validate().unwrap();
        assert_eq!(params.threads, 8);
        assert_eq!(params.min_scenario_score, 0);
        assert_eq!(params.interpretations_saved, 2);

        let params = SearchParameters {
            threads: 0,
            ..Default::default()
        };
        assert_eq!(params.validate().unwrap().threads, 1);
    }

    #[test]
    fn test_validate_rejects() {
        let bad = SearchParameters {
            accuracy: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(SpecGlobError::Config { .. })));

        let mut bad = SearchParameters::default();
        bad.modifications.residues.insert('B', 1.0);
        assert!(matches!(bad.validate(), Err(SpecGlobError::Config { .. })));
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "accuracy": 0.01,
            "peak_filter": {"type": "keep_all"},
            "coarse_strategy": "exhaustive_shift",
            "modifications": {"residues": {"C": 57.021464}}
        }"#;
        let params: SearchParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.accuracy, 0.01);
        assert_eq!(params.peak_filter, PeakFilter::KeepAll);
        assert_eq!(params.coarse_strategy, CoarseStrategy::ExhaustiveShift);
        assert_eq!(params.modifications.residue('C'), 57.021464);
        assert_eq!(params.surplus, 5);
        assert_eq!(params.main_scores, ScoreTable::default());
    }
}
