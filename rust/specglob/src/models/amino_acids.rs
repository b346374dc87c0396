//! Residue masses and the physical constants the alignment works with.
//!
//! The table is built once from [`Modifications`] and shared read-only by every
//! worker; residues are referred to by their index (`0..AMINO_ACID_COUNT`).

use crate::params::Modifications;

pub const AMINO_ACID_COUNT: usize = 22;

pub const H_MASS: f64 = 1.007825032241;
pub const H_PLUS_MASS: f64 = 1.007276466879;
pub const O_MASS: f64 = 15.99491461956;

/// Unmodified glycine, used to turn a mass discrepancy into a number of rows.
pub const SMALLEST_MASS: f64 = 57.021463721083;

pub const LETTERS: [char; AMINO_ACID_COUNT] = [
    'G', 'A', 'S', 'P', 'V', 'T', 'C', 'I', 'L', 'N', 'D', 'Q', 'K', 'E', 'M', 'H', 'F', 'R', 'Y',
    'W', 'U', 'O',
];

const BASE_MASSES: [f64; AMINO_ACID_COUNT] = [
    57.021463721083,
    71.037113785565,
    87.032028405125,
    97.052763850047,
    99.068413914529,
    101.047678469607,
    103.009184785565,
    113.084063979011,
    113.084063979011,
    114.042927442166,
    115.026943024685,
    128.058577506648,
    128.094963016052,
    129.042593089167,
    131.040484914529,
    137.058911859647,
    147.068413914529,
    156.101111025652,
    163.063328534089,
    186.07931295157,
    168.964198469607,
    255.158291550141,
];

#[derive(Debug, Clone)]
pub struct AminoAcidTable {
    masses: [f64; AMINO_ACID_COUNT],
    n_term_mass: f64,
    c_term_mass: f64,
}

impl Default for AminoAcidTable {
    fn default() -> Self {
        Self::new(&Modifications::default())
    }
}

impl AminoAcidTable {
    pub fn new(modifications: &Modifications) -> Self {
        let mut masses = BASE_MASSES;
        for (id, mass) in masses.iter_mut().enumerate() {
            *mass += modifications.residue(LETTERS[id]);
        }
        Self {
            masses,
            n_term_mass: H_MASS + modifications.n_term,
            c_term_mass: H_MASS + O_MASS + modifications.c_term,
        }
    }

    #[inline]
    pub fn mass(&self, id: u8) -> f64 {
        self.masses[id as usize]
    }

    pub fn masses(&self) -> &[f64; AMINO_ACID_COUNT] {
        &self.masses
    }

    #[inline]
    pub fn letter(id: u8) -> char {
        LETTERS[id as usize]
    }

    pub fn id_of(letter: char) -> Option<u8> {
        LETTERS
            .iter()
            .position(|&x| x == letter.to_ascii_uppercase())
            .map(|x| x as u8)
    }

    /// Mass of the N-terminal anchor column (the y0 ion).
    pub fn first_mass(&self) -> f64 {
        self.c_term_mass + self.n_term_mass + H_PLUS_MASS
    }
}
