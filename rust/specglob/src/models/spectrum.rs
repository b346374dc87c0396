use super::amino_acids::{
    AminoAcidTable,
    H_PLUS_MASS,
};
use crate::params::{
    PeakFilter,
    SearchParameters,
};
use crate::transform::TransformedSpectrum;
use rayon::prelude::*;
use tracing::{
    debug,
    info,
};

/// A spectrum as read from the input file, before any filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpectrum {
    pub title: String,
    pub scan: Option<u32>,
    pub precursor_mz: f64,
    pub charge: u32,
    /// `(mz, intensity)` pairs in file order.
    pub peaks: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeSpectrum {
    pub id: usize,
    pub title: String,
    pub scan: Option<u32>,
    pub precursor_mz: f64,
    pub charge: u32,
    peaks: Vec<f64>,
}

impl NativeSpectrum {
    /// Builds a spectrum from already filtered peak masses. The peaks are sorted.
    pub fn new(
        id: usize,
        title: String,
        scan: Option<u32>,
        precursor_mz: f64,
        charge: u32,
        mut peaks: Vec<f64>,
    ) -> Self {
        peaks.sort_by(|a, b| a.total_cmp(b));
        Self {
            id,
            title,
            scan,
            precursor_mz,
            charge,
            peaks,
        }
    }

    /// Applies the peak filter. `None` when fewer than `min_peaks` distinct peaks remain.
    pub fn from_raw(raw: RawSpectrum, params: &SearchParameters) -> Option<Self> {
        let peaks = filter_peaks(&raw.peaks, params.peak_filter, params.accuracy, params.min_peaks)?;
        Some(Self {
            id: 0,
            title: raw.title,
            scan: raw.scan,
            precursor_mz: raw.precursor_mz,
            charge: raw.charge,
            peaks,
        })
    }

    /// Sorted peak masses.
    pub fn peaks(&self) -> &[f64] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Neutral precursor mass, minus a hypothesised non-aligned mass.
    pub fn precursor_mass(&self, non_aligned_mass: f64) -> f64 {
        let charge = self.charge as f64;
        self.precursor_mz * charge - charge * H_PLUS_MASS - non_aligned_mass
    }

    pub fn has_peak_near(&self, mass: f64, accuracy: f64) -> bool {
        let start = self.peaks.partition_point(|&x| x < mass - accuracy);
        self.peaks
            .get(start)
            .is_some_and(|&x| x <= mass + accuracy)
    }
}

/// Keeps the most intense peaks; a peak closer than `accuracy` to a more
/// intense one is dropped first. Returns sorted masses.
fn filter_peaks(
    peaks: &[(f64, f64)],
    filter: PeakFilter,
    accuracy: f64,
    min_peaks: usize,
) -> Option<Vec<f64>> {
    let mut by_intensity: Vec<(f64, f64)> = peaks
        .iter()
        .copied()
        .filter(|(mz, intensity)| mz.is_finite() && intensity.is_finite())
        .collect();
    by_intensity.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut kept_masses: Vec<f64> = Vec::with_capacity(by_intensity.len());
    let mut kept: Vec<f64> = Vec::with_capacity(by_intensity.len());
    for (mz, _) in by_intensity {
        let idx = kept_masses.partition_point(|&x| x < mz);
        let close_below = idx > 0 && (mz - kept_masses[idx - 1]) < accuracy;
        let close_above = idx < kept_masses.len() && (kept_masses[idx] - mz) < accuracy;
        if close_below || close_above {
            continue;
        }
        kept_masses.insert(idx, mz);
        kept.push(mz);
    }
    if kept.len() < min_peaks {
        return None;
    }
    if let PeakFilter::MostIntense { count } = filter {
        kept.truncate(count);
    }
    kept.sort_by(|a, b| a.total_cmp(b));
    Some(kept)
}

enum LoadOutcome {
    Kept(NativeSpectrum, usize),
    TooFewPeaks,
    TooFewHits,
}

/// The searchable spectra of a run, with ids assigned in load order.
#[derive(Debug, Clone, Default)]
pub struct SpectrumCollection {
    spectra: Vec<NativeSpectrum>,
    max_native_peak_count: usize,
    max_column_count: usize,
    /// Spectra dropped for having too few peaks.
    pub dropped_few_peaks: usize,
    /// Spectra dropped for having too few amino-acid positions.
    pub dropped_few_hits: usize,
}

impl SpectrumCollection {
    /// Filters the raw spectra and keeps those whose first transformation is
    /// usable. The transformation is done in parallel, one reusable buffer per
    /// rayon thread.
    pub fn prepare(
        raw: Vec<RawSpectrum>,
        params: &SearchParameters,
        table: &AminoAcidTable,
    ) -> Self {
        let total = raw.len();
        let checked: Vec<LoadOutcome> = raw
            .into_par_iter()
            .map_init(TransformedSpectrum::default, |buffer, raw| {
                let Some(spectrum) = NativeSpectrum::from_raw(raw, params) else {
                    return LoadOutcome::TooFewPeaks;
                };
                buffer.rebuild(&spectrum, table, params.accuracy, None, 0.0);
                if buffer.hits() < params.min_amino_acid_hits {
                    debug!(
                        "Dropping spectrum {:?}: {} amino-acid positions",
                        spectrum.title,
                        buffer.hits()
                    );
                    return LoadOutcome::TooFewHits;
                }
                LoadOutcome::Kept(spectrum, buffer.column_count())
            })
            .collect();

        let mut out = Self::default();
        for item in checked {
            match item {
                LoadOutcome::Kept(mut spectrum, columns) => {
                    spectrum.id = out.spectra.len();
                    out.max_native_peak_count = out.max_native_peak_count.max(spectrum.len());
                    out.max_column_count = out.max_column_count.max(columns);
                    out.spectra.push(spectrum);
                }
                LoadOutcome::TooFewPeaks => out.dropped_few_peaks += 1,
                LoadOutcome::TooFewHits => out.dropped_few_hits += 1,
            }
        }
        info!(
            "Kept {} of {} spectra ({} with too few peaks, {} with too few amino acids)",
            out.spectra.len(),
            total,
            out.dropped_few_peaks,
            out.dropped_few_hits
        );
        out
    }

    /// Wraps spectra that were built directly; ids are reassigned in order.
    pub fn from_spectra(mut spectra: Vec<NativeSpectrum>) -> Self {
        for (i, s) in spectra.iter_mut().enumerate() {
            s.id = i;
        }
        let max_native_peak_count = spectra.iter().map(|s| s.len()).max().unwrap_or(0);
        Self {
            max_column_count: 2 * max_native_peak_count + 2,
            max_native_peak_count,
            spectra,
            dropped_few_peaks: 0,
            dropped_few_hits: 0,
        }
    }

    pub fn spectra(&self) -> &[NativeSpectrum] {
        &self.spectra
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    pub fn max_native_peak_count(&self) -> usize {
        self.max_native_peak_count
    }

    pub fn max_column_count(&self) -> usize {
        self.max_column_count
    }
}
