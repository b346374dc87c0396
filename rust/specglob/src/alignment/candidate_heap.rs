use crate::models::location::Candidate;

/// Keeps the K best coarse candidates of one spectrum across all proteins.
///
/// The entries form a binary min-heap on score, so the weakest candidate sits
/// at the root and can be evicted in `O(log K)`. Within the protein being
/// scanned, each tree (an independent alignment chain restarted from column 0)
/// owns at most one slot: offering a tree again only improves its slot.
///
/// # Example
///
/// ```
/// use specglob::alignment::candidate_heap::CandidateHeap;
///
/// let mut heap = CandidateHeap::new(2, 10);
/// heap.begin_spectrum(0, 10);
/// heap.begin_protein(0);
/// let a = heap.open_tree();
/// let b = heap.open_tree();
/// heap.try_add(1, 8, 30, a);
/// heap.try_add(3, 9, 12, b);
/// assert_eq!(heap.try_add(1, 8, 40, a), 12);
///
/// let kept = heap.drain_locations(0.5);
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].score, 40);
/// ```
#[derive(Debug, Clone)]
pub struct CandidateHeap {
    entries: Vec<Candidate>,
    owners: Vec<Option<usize>>,
    trees_position: Vec<Option<usize>>,
    protein_id: usize,
    spectrum_id: usize,
    max_score: i32,
    floor: i32,
}

impl CandidateHeap {
    pub fn new(capacity: usize, min_score: i32) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: vec![Candidate::empty(min_score); capacity],
            owners: vec![None; capacity],
            trees_position: Vec::new(),
            protein_id: 0,
            spectrum_id: 0,
            max_score: min_score,
            floor: min_score,
        }
    }

    /// Forgets every candidate; the heap is filled with placeholders at `min_score`.
    pub fn begin_spectrum(&mut self, spectrum_id: usize, min_score: i32) {
        self.entries.fill(Candidate::empty(min_score));
        self.owners.fill(None);
        self.trees_position.clear();
        self.spectrum_id = spectrum_id;
        self.max_score = min_score;
        self.floor = min_score;
    }

    /// Tree ids are only meaningful within one protein.
    pub fn begin_protein(&mut self, protein_id: usize) {
        self.protein_id = protein_id;
        self.owners.fill(None);
        self.trees_position.clear();
    }

    pub fn open_tree(&mut self) -> usize {
        self.trees_position.push(None);
        self.trees_position.len() - 1
    }

    /// Offers a candidate for `tree` and returns the lowest score held.
    pub fn try_add(&mut self, start_row: i64, end_row: i64, score: i32, tree: usize) -> i32 {
        if tree >= self.trees_position.len() {
            self.trees_position.resize(tree + 1, None);
        }
        match self.trees_position[tree] {
            Some(pos) => {
                if score > self.entries[pos].score {
                    let entry = &mut self.entries[pos];
                    entry.start_row = start_row;
                    entry.end_row = end_row;
                    entry.score = score;
                    self.sift_down(pos);
                }
            }
            None => {
                if score > self.entries[0].score {
                    if let Some(evicted) = self.owners[0] {
                        self.trees_position[evicted] = None;
                    }
                    self.entries[0] = Candidate {
                        start_row,
                        end_row,
                        score,
                        protein_id: Some(self.protein_id),
                        spectrum_id: self.spectrum_id,
                    };
                    self.owners[0] = Some(tree);
                    self.trees_position[tree] = Some(0);
                    self.sift_down(0);
                }
            }
        }
        self.max_score = self.max_score.max(score);
        self.entries[0].score
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.entries[left].score < self.entries[smallest].score {
                smallest = left;
            }
            if right < len && self.entries[right].score < self.entries[smallest].score {
                smallest = right;
            }
            if smallest == pos {
                return;
            }
            self.entries.swap(pos, smallest);
            self.owners.swap(pos, smallest);
            for slot in [pos, smallest] {
                if let Some(tree) = self.owners[slot] {
                    self.trees_position[tree] = Some(slot);
                }
            }
            pos = smallest;
        }
    }

    pub fn min_score(&self) -> i32 {
        self.entries[0].score
    }

    pub fn max_score(&self) -> i32 {
        self.max_score
    }

    /// Candidates scoring at least `ratio` times the best one, best first.
    /// The running maximum is reset.
    pub fn drain_locations(&mut self, ratio: f64) -> Vec<Candidate> {
        let threshold = self.max_score as f64 * ratio;
        self.max_score = self.floor;
        let mut out: Vec<Candidate> = self
            .entries
            .iter()
            .filter(|x| {
                x.protein_id.is_some()
                    && x.spectrum_id == self.spectrum_id
                    && x.score as f64 >= threshold
            })
            .copied()
            .collect();
        out.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.protein_id.cmp(&b.protein_id))
                .then(a.start_row.cmp(&b.start_row))
        });
        out
    }
}
