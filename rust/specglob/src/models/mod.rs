pub mod amino_acids;
pub mod location;
pub mod protein;
pub mod spectrum;

pub use amino_acids::AminoAcidTable;
pub use location::{
    Candidate,
    Location,
};
pub use protein::{
    Protein,
    ProteinDatabase,
};
pub use spectrum::{
    NativeSpectrum,
    RawSpectrum,
    SpectrumCollection,
};
