use crate::errors::{
    Result,
    SpecGlobError,
};
use crate::models::ProteinDatabase;
use crate::pipeline::{
    Interpretation,
    SpectrumReport,
};
use crate::scheduler::ReportSink;
use std::fs::File;
use std::io::{
    BufWriter,
    Write,
};
use std::path::{
    Path,
    PathBuf,
};

pub const RESULTS_HEADER: [&str; 14] = [
    "spectrum title",
    "spectrum scan",
    "spectrum id",
    "peptide",
    "protein positions",
    "alignment",
    "score",
    "number of shared peaks",
    "post-processed non-aligned mass",
    "post-processed peptide",
    "post-processed protein positions",
    "post-processed alignment",
    "post-processed score",
    "post-processed number of common peaks",
];

/// `;`-delimited results, one row per kept interpretation.
pub struct ResultsWriter<W: Write> {
    writer: csv::Writer<W>,
    path: Option<PathBuf>,
    rows: usize,
}

impl ResultsWriter<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| SpecGlobError::io_at(e, path))?;
        let mut out = Self::new(file)?;
        out.path = Some(path.to_path_buf());
        Ok(out)
    }
}

impl<W: Write> ResultsWriter<W> {
    /// Wraps `inner` and writes the header.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_writer(inner);
        writer.write_record(RESULTS_HEADER)?;
        Ok(Self {
            writer,
            path: None,
            rows: 0,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn write_report(&mut self, report: &SpectrumReport) -> Result<()> {
        let scan = report.scan.map(|x| x.to_string()).unwrap_or_default();
        let id = report.spectrum_id.to_string();
        if report.interpretations.is_empty() {
            let mut record = vec![report.title.as_str(), scan.as_str(), id.as_str()];
            record.resize(RESULTS_HEADER.len(), "");
            self.writer.write_record(&record)?;
            self.rows += 1;
            return Ok(());
        }

        for saved in report.interpretations.iter() {
            let mut record: Vec<String> = Vec::with_capacity(RESULTS_HEADER.len());
            record.push(report.title.clone());
            record.push(scan.clone());
            record.push(id.clone());
            push_interpretation(&mut record, &saved.main);
            match &saved.retry {
                Some(retry) => {
                    record.push(format!("{:.2}", retry.alignment.non_aligned_mass));
                    push_interpretation(&mut record, retry);
                }
                None => record.resize(RESULTS_HEADER.len(), String::new()),
            }
            self.writer.write_record(&record)?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| match &self.path {
            Some(path) => SpecGlobError::io_at(e, path),
            None => e.into(),
        })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| SpecGlobError::from(e.into_error()))
    }
}

fn push_interpretation(record: &mut Vec<String>, interpretation: &Interpretation) {
    record.push(interpretation.rendered.peptide.clone());
    record.push(interpretation.protein_positions.clone());
    record.push(interpretation.rendered.alignment.clone());
    record.push(interpretation.alignment.score.to_string());
    record.push(interpretation.alignment.peaks_in_common.to_string());
}

impl<W: Write> ReportSink for ResultsWriter<W> {
    fn write_batch(&mut self, reports: &[SpectrumReport]) -> Result<()> {
        for report in reports {
            self.write_report(report)?;
        }
        self.flush()
    }
}

/// Writes one protein name per line, in load order.
pub fn write_protein_names(path: &Path, proteins: &ProteinDatabase) -> Result<()> {
    let file = File::create(path).map_err(|e| SpecGlobError::io_at(e, path))?;
    let mut writer = BufWriter::new(file);
    for protein in proteins.proteins() {
        writeln!(writer, "{}", protein.name).map_err(|e| SpecGlobError::io_at(e, path))?;
    }
    writer.flush().map_err(|e| SpecGlobError::io_at(e, path))
}
