//! Per-spectrum search pipeline.
//!
//! A [`SpectrumSearcher`] owns every buffer the search of one spectrum
//! needs and is reused, one per worker, across all the spectra that worker
//! handles. Searching a spectrum goes through these stages:
//!
//! 1. **Transform**: build the column space of the spectrum with no mask and
//!    no non-aligned mass. Spectra with too few amino-acid positions are
//!    skipped.
//! 2. **Coarse scan**: align against every protein and keep the best
//!    locations in the candidate heap.
//! 3. **Refined scan**: realign each location with back-pointers, then
//!    remove peaks used twice.
//! 4. **Post-processing**: retry the kept interpretations under every
//!    plausible non-aligned mass.

use crate::alignment::{
    Alignment,
    CandidateHeap,
    CoarseScanner,
    PostProcessor,
    RefinedAligner,
    RenderedAlignment,
};
use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::models::{
    AminoAcidTable,
    Location,
    NativeSpectrum,
    Protein,
    ProteinDatabase,
};
use crate::params::SearchParameters;
use crate::transform::TransformedSpectrum;
use serde::Serialize;
use std::time::{
    Duration,
    Instant,
};
use tracing::debug;

/// Accumulated time spent in each stage of the pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineTimings {
    pub transform: Duration,
    pub coarse: Duration,
    pub refined: Duration,
    /// Declustering and non-aligned mass retries.
    pub post_processing: Duration,
}

impl Serialize for PipelineTimings {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("PipelineTimings", 4)?;
        state.serialize_field("transform_ms", &self.transform.as_millis())?;
        state.serialize_field("coarse_ms", &self.coarse.as_millis())?;
        state.serialize_field("refined_ms", &self.refined.as_millis())?;
        state.serialize_field("post_processing_ms", &self.post_processing.as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for PipelineTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.transform += rhs.transform;
        self.coarse += rhs.coarse;
        self.refined += rhs.refined;
        self.post_processing += rhs.post_processing;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumStatus {
    Saved,
    /// Too few amino-acid positions in the transformed spectrum.
    Skipped,
}

/// An alignment together with its printable forms.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub alignment: Alignment,
    pub rendered: RenderedAlignment,
    pub protein_positions: String,
}

impl Interpretation {
    fn new(
        alignment: Alignment,
        protein: &Protein,
        proteins: &ProteinDatabase,
        table: &AminoAcidTable,
    ) -> Self {
        let rendered = alignment.render(alignment.location.residues(protein), table);
        let protein_positions = proteins.peptide_positions(&rendered.peptide);
        Self {
            alignment,
            rendered,
            protein_positions,
        }
    }
}

/// One kept interpretation and, when it beat it, its non-aligned mass retry.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedInterpretation {
    pub main: Interpretation,
    pub retry: Option<Interpretation>,
}

/// Everything the results file needs about one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumReport {
    pub spectrum_id: usize,
    pub title: String,
    pub scan: Option<u32>,
    pub status: SpectrumStatus,
    /// Best first.
    pub interpretations: Vec<SavedInterpretation>,
}

impl SpectrumReport {
    fn empty(spectrum: &NativeSpectrum, status: SpectrumStatus) -> Self {
        Self {
            spectrum_id: spectrum.id,
            title: spectrum.title.clone(),
            scan: spectrum.scan,
            status,
            interpretations: Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&SavedInterpretation> {
        self.interpretations.first()
    }
}

/// Per-worker search state over a shared protein database.
pub struct SpectrumSearcher<'a> {
    proteins: &'a ProteinDatabase,
    table: &'a AminoAcidTable,
    params: &'a SearchParameters,
    transformed: TransformedSpectrum,
    coarse: CoarseScanner,
    refined: RefinedAligner,
    heap: CandidateHeap,
    post: PostProcessor,
    pub timings: PipelineTimings,
}

impl<'a> SpectrumSearcher<'a> {
    pub fn new(
        proteins: &'a ProteinDatabase,
        table: &'a AminoAcidTable,
        params: &'a SearchParameters,
    ) -> Self {
        Self {
            proteins,
            table,
            params,
            transformed: TransformedSpectrum::default(),
            coarse: CoarseScanner::default(),
            refined: RefinedAligner::default(),
            heap: CandidateHeap::new(params.locations_saved, params.min_scenario_score),
            post: PostProcessor::default(),
            timings: PipelineTimings::default(),
        }
    }

    /// Pre-sizes the scratch buffers for spectra of up to `peaks` native
    /// peaks and `columns` columns, as reported by the spectrum collection.
    pub fn reserve(&mut self, peaks: usize, columns: usize) {
        let residues = self.proteins.max_length();
        self.transformed.reserve(peaks, columns);
        self.coarse.reserve(residues, columns);
        self.refined.reserve(residues, columns);
        self.post.reserve(peaks, residues, columns);
    }

    fn protein(&self, protein_id: usize) -> Result<&'a Protein> {
        self.proteins.get(protein_id).ok_or_else(|| {
            DataProcessingError::IndexOutOfBounds {
                index: protein_id,
                len: self.proteins.len(),
                context: "protein of a candidate location".to_string(),
            }
            .into()
        })
    }

    pub fn search(&mut self, spectrum: &NativeSpectrum) -> Result<SpectrumReport> {
        let params = self.params;
        let table = self.table;

        let st = Instant::now();
        self.transformed
            .rebuild(spectrum, table, params.accuracy, None, 0.0);
        self.timings.transform += st.elapsed();
        if self.transformed.hits() < params.min_amino_acid_hits {
            debug!(
                "Skipping spectrum {} ({:?}): {} amino-acid positions",
                spectrum.id,
                spectrum.title,
                self.transformed.hits()
            );
            return Ok(SpectrumReport::empty(spectrum, SpectrumStatus::Skipped));
        }

        let st = Instant::now();
        self.heap
            .begin_spectrum(spectrum.id, params.min_scenario_score);
        self.coarse.scan(
            &self.transformed,
            self.proteins,
            table,
            params,
            &mut self.heap,
        );
        let candidates = self.heap.drain_locations(params.locations_score_threshold);
        self.timings.coarse += st.elapsed();

        let mut alignments = Vec::with_capacity(candidates.len());
        for candidate in candidates.iter() {
            let Some(protein_id) = candidate.protein_id else {
                continue;
            };
            let protein = self.protein(protein_id)?;
            let Some(location) = Location::from_candidate(candidate, protein) else {
                continue;
            };
            let residues = location.residues(protein);

            let st = Instant::now();
            let best = self
                .refined
                .align(&self.transformed, residues, table, params);
            let alignment = match best {
                Some(best) => Some(Alignment::reconstruct(
                    best,
                    self.refined.matrix(),
                    &self.transformed,
                    spectrum,
                    location,
                    residues,
                    table,
                )?),
                None => None,
            };
            self.timings.refined += st.elapsed();
            let Some(mut alignment) = alignment else {
                continue;
            };

            if !params.disable_peak_cleaning {
                let st = Instant::now();
                alignment = self
                    .post
                    .decluster(alignment, spectrum, residues, table, params)?;
                self.timings.post_processing += st.elapsed();
            }
            if alignment.score > params.min_scenario_score {
                alignments.push(alignment);
            }
        }
        alignments.sort_by(|a, b| a.rank_cmp(b));
        alignments.truncate(params.interpretations_saved);

        let mut report = SpectrumReport::empty(spectrum, SpectrumStatus::Saved);
        for alignment in alignments {
            let protein = self.protein(alignment.location.protein_id)?;
            let retry = if params.disable_non_aligned_mass {
                None
            } else {
                let st = Instant::now();
                let retry = self.post.retry_non_aligned_mass(
                    &alignment,
                    spectrum,
                    alignment.location.residues(protein),
                    table,
                    params,
                )?;
                self.timings.post_processing += st.elapsed();
                retry
            };
            let main = Interpretation::new(alignment, protein, self.proteins, table);
            let retry = retry.map(|x| Interpretation::new(x, protein, self.proteins, table));
            report
                .interpretations
                .push(SavedInterpretation { main, retry });
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timings_serialize_as_millis() {
        let timings = PipelineTimings {
            transform: Duration::from_millis(5),
            coarse: Duration::from_millis(1200),
            refined: Duration::from_micros(2500),
            post_processing: Duration::ZERO,
        };
        let json = serde_json::to_value(timings).unwrap();
        assert_eq!(json["transform_ms"], 5);
        assert_eq!(json["coarse_ms"], 1200);
        assert_eq!(json["refined_ms"], 2);
        assert_eq!(json["post_processing_ms"], 0);
    }

    #[test]
    fn test_timings_add_assign() {
        let mut total = PipelineTimings::default();
        let part = PipelineTimings {
            transform: Duration::from_millis(1),
            coarse: Duration::from_millis(2),
            refined: Duration::from_millis(3),
            post_processing: Duration::from_millis(4),
        };
        total += part;
        total += part;
        assert_eq!(total.coarse, Duration::from_millis(4));
        assert_eq!(total.post_processing, Duration::from_millis(8));
    }
}
