use crate::errors::{
    Result,
    SpecGlobError,
};
use crate::models::{
    Protein,
    ProteinDatabase,
};
use regex::Regex;
use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
};
use std::path::Path;
use tracing::info;

/// Reads a FASTA protein database.
pub fn read_fasta(path: &Path) -> Result<ProteinDatabase> {
    if !path.exists() {
        return Err(SpecGlobError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| SpecGlobError::io_at(e, path))?;
    let proteins = parse_fasta(BufReader::new(file))?;
    let db = ProteinDatabase::new(proteins);
    info!(
        "Loaded {} proteins from {} (longest: {} residues)",
        db.len(),
        path.display(),
        db.max_length()
    );
    Ok(db)
}

/// Parses FASTA entries. The protein name is the text between the first and
/// last `|` of the header, or its first word when there is no `|`.
pub fn parse_fasta<R: BufRead>(reader: R) -> Result<Vec<Protein>> {
    let name_pattern = Regex::new(r"\|(.+)\|").map_err(SpecGlobError::parse)?;
    let mut out = Vec::new();
    let mut header: Option<(String, String)> = None;
    let mut sequence = String::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        if let Some(description) = line.strip_prefix('>') {
            if let Some((name, description)) = header.take() {
                out.push(Protein::new(name, description, std::mem::take(&mut sequence)));
            }
            let name = match name_pattern.captures(description) {
                Some(caps) => caps[1].to_string(),
                None => description
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string(),
            };
            header = Some((name, description.to_string()));
        } else {
            if header.is_none() {
                return Err(SpecGlobError::parse(format!(
                    "sequence line before any FASTA header: {:?}",
                    line
                )));
            }
            sequence.push_str(line.trim());
        }
    }
    if let Some((name, description)) = header {
        out.push(Protein::new(name, description, sequence));
    }
    Ok(out)
}
