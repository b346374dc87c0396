//! Thin readers and writers around the search: FASTA proteins, MGF spectra
//! and the delimited results file.

pub mod fasta;
pub mod mgf;
pub mod results;

pub use fasta::read_fasta;
pub use mgf::read_mgf;
pub use results::{
    ResultsWriter,
    write_protein_names,
};

use crate::errors::{
    Result,
    SpecGlobError,
};
use crate::models::RawSpectrum;
use std::path::Path;

/// Reads spectra, picking the format from the file extension.
pub fn read_spectra(path: &Path) -> Result<Vec<RawSpectrum>> {
    let extension = path
        .extension()
        .and_then(|x| x.to_str())
        .map(|x| x.to_ascii_lowercase());
    match extension.as_deref() {
        Some("mgf") => read_mgf(path),
        Some("mzml") => Err(SpecGlobError::config(format!(
            "{}: mzML input is not supported, convert it to MGF",
            path.display()
        ))),
        _ => Err(SpecGlobError::config(format!(
            "{}: unknown spectra format, expected a .mgf file",
            path.display()
        ))),
    }
}
