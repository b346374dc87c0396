use crate::errors::{
    Result,
    SpecGlobError,
};
use crate::models::RawSpectrum;
use regex::Regex;
use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
};
use std::path::Path;
use tracing::{
    info,
    warn,
};

#[derive(Debug, Default)]
struct Block {
    title: String,
    scan: Option<u32>,
    precursor_mz: Option<f64>,
    charge: Option<u32>,
    peaks: Vec<(f64, f64)>,
}

pub fn read_mgf(path: &Path) -> Result<Vec<RawSpectrum>> {
    if !path.exists() {
        return Err(SpecGlobError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| SpecGlobError::io_at(e, path))?;
    let spectra = parse_mgf(BufReader::new(file))?;
    info!("Read {} spectra from {}", spectra.len(), path.display());
    Ok(spectra)
}

/// Parses `BEGIN IONS` / `END IONS` blocks. Blocks without a precursor or a
/// charge are skipped with a warning.
pub fn parse_mgf<R: BufRead>(reader: R) -> Result<Vec<RawSpectrum>> {
    let scan_pattern = Regex::new(r"scan=(\d+)").map_err(SpecGlobError::parse)?;
    let mut out = Vec::new();
    let mut block: Option<Block> = None;

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.starts_with("BEGIN IONS") {
            block = Some(Block::default());
            continue;
        }
        let Some(current) = block.as_mut() else {
            continue;
        };

        if let Some(title) = line.strip_prefix("TITLE=") {
            current.title = title.to_string();
        } else if let Some(scan) = line
            .strip_prefix("SCANS=")
            .or_else(|| line.strip_prefix("SCAN="))
        {
            current.scan = scan.trim().parse().ok();
        } else if let Some(pepmass) = line.strip_prefix("PEPMASS=") {
            let first = pepmass.split_whitespace().next().unwrap_or_default();
            current.precursor_mz = Some(first.parse().map_err(|_| {
                SpecGlobError::parse(format!(
                    "line {}: invalid PEPMASS {:?}",
                    line_number + 1,
                    pepmass
                ))
            })?);
        } else if let Some(charge) = line.strip_prefix("CHARGE=") {
            current.charge = parse_charge(charge);
        } else if line.starts_with("END IONS") {
            let Some(done) = block.take() else {
                continue;
            };
            if let Some(spectrum) = finish_block(done, &scan_pattern) {
                out.push(spectrum);
            }
        } else if line.starts_with(|c: char| c.is_ascii_digit()) {
            let mut values = line.split_whitespace();
            let (Some(mz), Some(intensity)) = (values.next(), values.next()) else {
                return Err(SpecGlobError::parse(format!(
                    "line {}: expected 'mz intensity', got {:?}",
                    line_number + 1,
                    line
                )));
            };
            current.peaks.push((mz.parse()?, intensity.parse()?));
        }
    }
    Ok(out)
}

/// Leading digits of a `CHARGE=` value, e.g. `2+` or `3`.
fn parse_charge(value: &str) -> Option<u32> {
    let digits: String = value
        .trim()
        .trim_start_matches('+')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|&x: &u32| x > 0)
}

fn finish_block(block: Block, scan_pattern: &Regex) -> Option<RawSpectrum> {
    let (Some(precursor_mz), Some(charge)) = (block.precursor_mz, block.charge) else {
        warn!(
            "Skipping spectrum {:?}: missing precursor mass or charge",
            block.title
        );
        return None;
    };
    let scan = block.scan.or_else(|| {
        scan_pattern
            .captures(&block.title)
            .and_then(|caps| caps[1].parse().ok())
    });
    Some(RawSpectrum {
        title: block.title,
        scan,
        precursor_mz,
        charge,
        peaks: block.peaks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MGF: &str = "\
BEGIN IONS
TITLE=run1.100.100.2 File:\"run1.raw\", NativeID:\"controllerType=0 scan=100\"
PEPMASS=400.7 1234.5
CHARGE=2+
RTINSECONDS=12.5
101.1 10
202.2 20.5
END IONS

BEGIN IONS
TITLE=second
SCANS=7
PEPMASS=500.25
CHARGE=3
150.0 1
END IONS
BEGIN IONS
TITLE=no charge
PEPMASS=500.25
150.0 1
END IONS
";

    #[test]
    fn test_parse_mgf() {
        let spectra = parse_mgf(MGF.as_bytes()).unwrap();
        assert_eq!(spectra.len(), 2);
        assert_eq!(spectra[0].scan, Some(100));
        assert_eq!(spectra[0].charge, 2);
        assert!((spectra[0].precursor_mz - 400.7).abs() < 1e-12);
        assert_eq!(spectra[0].peaks, vec![(101.1, 10.0), (202.2, 20.5)]);
        assert_eq!(spectra[1].title, "second");
        assert_eq!(spectra[1].scan, Some(7));
        assert_eq!(spectra[1].charge, 3);
    }

    #[test]
    fn test_parse_charge() {
        assert_eq!(parse_charge("2+"), Some(2));
        assert_eq!(parse_charge(" 3"), Some(3));
        assert_eq!(parse_charge("+1"), Some(1));
        assert_eq!(parse_charge("0"), None);
        assert_eq!(parse_charge("x"), None);
    }

    #[test]
    fn test_malformed_peak() {
        let mgf = "BEGIN IONS\nPEPMASS=1\nCHARGE=1\n100.0\nEND IONS\n";
        assert!(parse_mgf(mgf.as_bytes()).is_err());
    }
}
