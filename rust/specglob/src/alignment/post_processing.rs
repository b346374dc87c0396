//! Corrections applied to a refined alignment: removing peaks the alignment
//! relies on twice, and retrying the alignment under a non-aligned mass.

use super::refined::RefinedAligner;
use super::result::Alignment;
use crate::errors::Result;
use crate::models::amino_acids::AminoAcidTable;
use crate::models::spectrum::NativeSpectrum;
use crate::params::SearchParameters;
use crate::transform::{
    PeakChoice,
    TransformedSpectrum,
};
use std::cmp::Ordering;
use tracing::{
    debug,
    warn,
};

/// Peaks used twice by consecutive steps of an alignment, split around the
/// middle peak.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedundantGroup {
    /// Peaks lighter than their complement.
    pub low: Vec<usize>,
    pub high: Vec<usize>,
}

/// Groups the peaks of `used` (as returned by [`Alignment::used_peaks`])
/// that appear twice. Each group is a run of duplicates nested around one
/// another, like `[.., 3, 4, 5, 5, 4, 3, ..]`.
pub fn redundant_groups(used: &[usize], middle_peak: usize, max_groups: usize) -> Vec<RedundantGroup> {
    let Some(&largest) = used.iter().max() else {
        return Vec::new();
    };
    let mut counts = vec![0u32; largest + 1];
    for &peak in used {
        counts[peak] += 1;
    }
    if counts.iter().all(|&c| c < 2) {
        return Vec::new();
    }

    let mut groups = Vec::new();
    let mut left = 0;
    let mut right = used.len() - 1;
    while left < right {
        while left < right && counts[used[left]] == 1 {
            left += 1;
        }
        if left >= right {
            break;
        }
        while right > left && used[left] != used[right] {
            right -= 1;
        }
        let mut group = RedundantGroup::default();
        loop {
            let peak = used[left];
            if peak <= middle_peak {
                group.low.push(peak);
            } else {
                group.high.push(peak);
            }
            left += 1;
            if right == 0 {
                break;
            }
            right -= 1;
            if !(left < right && counts[used[left]] == 2 && used[left] == used[right]) {
                break;
            }
        }
        groups.push(group);
    }

    if groups.len() > max_groups {
        warn!(
            "Alignment relies on {} groups of redundant peaks, only the first {} are explored",
            groups.len(),
            max_groups
        );
        groups.truncate(max_groups);
    }
    groups
}

/// Per-worker scratch for post-processing.
#[derive(Debug, Clone, Default)]
pub struct PostProcessor {
    transformed: TransformedSpectrum,
    aligner: RefinedAligner,
    mask: Vec<PeakChoice>,
}

impl PostProcessor {
    pub fn reserve(&mut self, peaks: usize, residues: usize, columns: usize) {
        self.transformed.reserve(peaks, columns);
        self.aligner.reserve(residues, columns);
        self.mask.reserve(peaks.saturating_sub(self.mask.len()));
    }

    /// Realigns `alignment` until it no longer relies on any peak twice.
    ///
    /// Every combination of groups is tried: a group keeps either the native
    /// side of its light peaks and the complementary side of its heavy ones,
    /// or the opposite. The best combination replaces the alignment, even
    /// when it scores lower.
    pub fn decluster(
        &mut self,
        alignment: Alignment,
        spectrum: &NativeSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
    ) -> Result<Alignment> {
        let mut current = alignment;
        // Every round removes at least one side of a native peak
        let max_rounds = spectrum.len() + 1;
        for _ in 0..max_rounds {
            let groups = redundant_groups(
                &current.used_peaks(),
                current.middle_peak(),
                params.max_redundant_groups,
            );
            if groups.is_empty() {
                return Ok(current);
            }

            self.mask.clear();
            self.mask.extend_from_slice(&current.peak_mask);
            self.mask.resize(spectrum.len(), PeakChoice::Both);
            let mut best = None;
            self.explore(&groups, &current, spectrum, residues, table, params, &mut best)?;
            match best {
                Some(x) => {
                    debug!(
                        "Spectrum {}: declustered {} groups, score {} -> {}",
                        current.spectrum_id,
                        groups.len(),
                        current.score,
                        x.score
                    );
                    current = x;
                }
                None => return Ok(current),
            }
        }
        warn!(
            "Spectrum {}: peak cleaning stopped after {} rounds",
            current.spectrum_id, max_rounds
        );
        Ok(current)
    }

    #[allow(clippy::too_many_arguments)]
    fn explore(
        &mut self,
        groups: &[RedundantGroup],
        current: &Alignment,
        spectrum: &NativeSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
        best: &mut Option<Alignment>,
    ) -> Result<()> {
        let Some((group, rest)) = groups.split_first() else {
            let candidate = self.realign(
                spectrum,
                current,
                current.non_aligned_mass,
                residues,
                table,
                params,
            )?;
            if let Some(candidate) = candidate {
                let better = match best.as_ref() {
                    None => true,
                    Some(b) => candidate.rank_cmp(b) == Ordering::Less,
                };
                if better {
                    *best = Some(candidate);
                }
            }
            return Ok(());
        };

        let saved_low: Vec<PeakChoice> = group.low.iter().map(|&p| self.mask[p - 1]).collect();
        let saved_high: Vec<PeakChoice> = group.high.iter().map(|&p| self.mask[p - 1]).collect();
        for (low, high) in [
            (PeakChoice::NativeOnly, PeakChoice::ComplementOnly),
            (PeakChoice::ComplementOnly, PeakChoice::NativeOnly),
        ] {
            for &peak in group.low.iter() {
                self.mask[peak - 1] = low;
            }
            for &peak in group.high.iter() {
                self.mask[peak - 1] = high;
            }
            self.explore(rest, current, spectrum, residues, table, params, best)?;
        }
        for (&peak, &choice) in group.low.iter().zip(saved_low.iter()) {
            self.mask[peak - 1] = choice;
        }
        for (&peak, &choice) in group.high.iter().zip(saved_high.iter()) {
            self.mask[peak - 1] = choice;
        }
        Ok(())
    }

    /// Rebuilds the spectrum under the current mask and `non_aligned_mass`,
    /// then realigns the location of `alignment`.
    fn realign(
        &mut self,
        spectrum: &NativeSpectrum,
        alignment: &Alignment,
        non_aligned_mass: f64,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
    ) -> Result<Option<Alignment>> {
        self.transformed.rebuild(
            spectrum,
            table,
            params.accuracy,
            Some(&self.mask),
            non_aligned_mass,
        );
        let Some(cell) = self
            .aligner
            .align(&self.transformed, residues, table, params)
        else {
            return Ok(None);
        };
        let out = Alignment::reconstruct(
            cell,
            self.aligner.matrix(),
            &self.transformed,
            spectrum,
            alignment.location,
            residues,
            table,
        )?;
        Ok(Some(out))
    }

    /// Retries `alignment` with every candidate non-aligned mass and returns
    /// the best retry, if it beats the original on score and on peaks in
    /// common.
    pub fn retry_non_aligned_mass(
        &mut self,
        alignment: &Alignment,
        spectrum: &NativeSpectrum,
        residues: &[u8],
        table: &AminoAcidTable,
        params: &SearchParameters,
    ) -> Result<Option<Alignment>> {
        let candidates = alignment.non_aligned_mass_candidates(residues, table);
        let mut best: Option<Alignment> = None;
        for mass in candidates {
            self.mask.clear();
            self.mask.extend_from_slice(&alignment.peak_mask);
            let Some(mut retry) = self.realign(spectrum, alignment, mass, residues, table, params)?
            else {
                continue;
            };
            if !params.disable_peak_cleaning {
                retry = self.decluster(retry, spectrum, residues, table, params)?;
            }
            let better = match best.as_ref() {
                None => true,
                Some(b) => retry.rank_cmp(b) == Ordering::Less,
            };
            if better {
                best = Some(retry);
            }
        }
        Ok(best.filter(|retry| {
            alignment.score <= retry.score && alignment.peaks_in_common < retry.peaks_in_common
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_redundancy() {
        assert!(redundant_groups(&[1, 2, 3, 4], 2, 10).is_empty());
        assert!(redundant_groups(&[], 2, 10).is_empty());
    }

    #[test]
    fn test_nested_group() {
        // Poly-alanine: p11 single, p1..p5 each used on both halves
        let used = [11, 1, 2, 3, 4, 5, 5, 4, 3, 2, 1];
        let groups = redundant_groups(&used, 5, 10);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].low, vec![1, 2, 3, 4, 5]);
        assert!(groups[0].high.is_empty());
    }

    #[test]
    fn test_split_around_middle() {
        let used = [2, 7, 7, 2];
        let groups = redundant_groups(&used, 4, 10);
        assert_eq!(
            groups,
            vec![RedundantGroup {
                low: vec![2],
                high: vec![7],
            }]
        );
    }

    #[test]
    fn test_separate_groups_are_capped() {
        let used = [1, 3, 4, 4, 3, 5, 6, 1];
        let groups = redundant_groups(&used, 3, 10);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].low, vec![1]);
        assert_eq!(groups[1].low, vec![3]);
        assert_eq!(groups[1].high, vec![4]);

        let capped = redundant_groups(&used, 3, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].low, vec![1]);
    }
}
