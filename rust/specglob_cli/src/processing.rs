use crate::config::RunConfig;
use crate::errors::CliError;
use indicatif::{
    ProgressBar,
    ProgressStyle,
};
use specglob::io::{
    ResultsWriter,
    read_fasta,
    read_spectra,
    write_protein_names,
};
use specglob::{
    AminoAcidTable,
    ReportSink,
    Result,
    SpectrumCollection,
    SpectrumReport,
    run_search,
};
use std::time::Instant;
use tracing::info;

/// Forwards each batch to the results file and advances the progress bar.
struct ProgressSink<S: ReportSink> {
    inner: S,
    bar: ProgressBar,
}

impl<S: ReportSink> ReportSink for ProgressSink<S> {
    fn write_batch(&mut self, reports: &[SpectrumReport]) -> Result<()> {
        self.inner.write_batch(reports)?;
        self.bar.inc(reports.len() as u64);
        Ok(())
    }
}

pub fn process(run: &RunConfig) -> std::result::Result<(), CliError> {
    let start = Instant::now();
    let params = &run.params;
    let table = AminoAcidTable::new(&params.modifications);

    let proteins = read_fasta(&run.proteins)?;
    let st = Instant::now();
    let raw = read_spectra(&run.spectra)?;
    let spectra = SpectrumCollection::prepare(raw, params, &table);
    info!(
        "Prepared {} spectra from {} in {:?} (max {} peaks, {} columns)",
        spectra.len(),
        run.spectra.display(),
        st.elapsed(),
        spectra.max_native_peak_count(),
        spectra.max_column_count()
    );

    std::fs::create_dir_all(&run.output_dir).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(run.output_dir.to_string_lossy().to_string()),
    })?;
    write_protein_names(&run.output_dir.join("proteins_names.txt"), &proteins)?;

    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bar = ProgressBar::new(spectra.len() as u64).with_style(style);
    let mut sink = ProgressSink {
        inner: ResultsWriter::create(&run.results_file)?,
        bar,
    };

    let timings = run_search(&spectra, &proteins, &table, params, &mut sink)?;
    sink.bar.finish();
    sink.inner.flush()?;

    info!(
        "Wrote {} rows to {}",
        sink.inner.rows(),
        run.results_file.display()
    );
    match serde_json::to_string(&timings) {
        Ok(x) => info!("Time spent per stage (summed over threads): {}", x),
        Err(e) => info!("Time spent per stage: {:?} ({})", timings, e),
    }
    info!("Finished searching {} spectra in {:?}", spectra.len(), start.elapsed());
    Ok(())
}
