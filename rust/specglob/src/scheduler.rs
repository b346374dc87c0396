//! Multi-worker batched search.
//!
//! Workers pull spectrum ids from a shared cursor, but never past the
//! watermark: the end of the batch currently allowed in flight. Once every
//! spectrum below the watermark is done, the coordinator (the calling
//! thread) hands the batch to the [`ReportSink`] in spectrum id order,
//! advances the watermark and wakes the workers.
//!
//! Any worker failure stops the run, panics included. Batches already
//! flushed stay written; the failing batch never reaches the sink.

use crate::errors::{
    Result,
    SpecGlobError,
};
use crate::models::{
    AminoAcidTable,
    NativeSpectrum,
    ProteinDatabase,
    SpectrumCollection,
};
use crate::params::SearchParameters;
use crate::pipeline::{
    PipelineTimings,
    SpectrumReport,
    SpectrumSearcher,
};
use std::any::Any;
use std::panic::{
    AssertUnwindSafe,
    catch_unwind,
};
use std::sync::{
    Condvar,
    Mutex,
    MutexGuard,
    PoisonError,
};
use tracing::{
    debug,
    error,
    info,
};

/// Receives the reports of each completed batch, in spectrum id order.
pub trait ReportSink {
    fn write_batch(&mut self, reports: &[SpectrumReport]) -> Result<()>;
}

impl ReportSink for Vec<SpectrumReport> {
    fn write_batch(&mut self, reports: &[SpectrumReport]) -> Result<()> {
        self.extend_from_slice(reports);
        Ok(())
    }
}

/// What one worker thread runs for each spectrum it is handed.
trait SearchWorker {
    fn search(&mut self, spectrum: &NativeSpectrum) -> Result<SpectrumReport>;
    fn into_timings(self) -> PipelineTimings;
}

impl SearchWorker for SpectrumSearcher<'_> {
    fn search(&mut self, spectrum: &NativeSpectrum) -> Result<SpectrumReport> {
        SpectrumSearcher::search(self, spectrum)
    }

    fn into_timings(self) -> PipelineTimings {
        self.timings
    }
}

#[derive(Debug)]
struct Dispatch {
    next: usize,
    watermark: usize,
    completed: usize,
    aborted: bool,
    failure: Option<SpecGlobError>,
}

struct Monitor {
    state: Mutex<Dispatch>,
    /// Signalled when the watermark moves or the run is aborted.
    work: Condvar,
    /// Signalled when a batch completes or a worker fails.
    batch: Condvar,
}

impl Monitor {
    fn lock(&self) -> MutexGuard<'_, Dispatch> {
        // A poisoned lock only means a worker panicked; the counters are still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next spectrum id for a worker, waiting for the watermark if needed.
    /// `None` once every spectrum is dispatched or the run is aborted.
    fn next_spectrum(&self, total: usize) -> Option<usize> {
        let mut state = self.lock();
        loop {
            if state.aborted || state.next >= total {
                return None;
            }
            if state.next < state.watermark {
                let id = state.next;
                state.next += 1;
                return Some(id);
            }
            state = self.work.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self) {
        let mut state = self.lock();
        state.completed += 1;
        if state.completed == state.watermark {
            self.batch.notify_one();
        }
    }

    fn fail(&self, err: SpecGlobError) {
        let mut state = self.lock();
        state.aborted = true;
        if state.failure.is_none() {
            state.failure = Some(err);
        }
        self.work.notify_all();
        self.batch.notify_one();
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.work.notify_all();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}

fn run_worker<W: SearchWorker>(
    monitor: &Monitor,
    slots: &[Mutex<Option<SpectrumReport>>],
    spectra: &SpectrumCollection,
    mut worker: W,
) -> PipelineTimings {
    let total = spectra.len();
    while let Some(id) = monitor.next_spectrum(total) {
        let spectrum = &spectra.spectra()[id];
        // A worker that panicked is not handed another spectrum
        let outcome = catch_unwind(AssertUnwindSafe(|| worker.search(spectrum)))
            .unwrap_or_else(|payload| {
                Err(SpecGlobError::Panic {
                    msg: panic_message(payload),
                })
            });
        match outcome {
            Ok(report) => {
                *slots[id % slots.len()]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(report);
                monitor.complete();
            }
            Err(err) => {
                error!("Search failed on spectrum {} ({:?}): {}", id, spectrum.title, err);
                monitor.fail(SpecGlobError::WorkerFault {
                    spectrum_id: Some(id),
                    source: Box::new(err),
                });
                break;
            }
        }
    }
    worker.into_timings()
}

fn coordinate(
    monitor: &Monitor,
    slots: &[Mutex<Option<SpectrumReport>>],
    total: usize,
    sink: &mut dyn ReportSink,
) -> Result<()> {
    let batch_size = slots.len();
    let mut flushed = 0;
    let mut reports = Vec::with_capacity(batch_size);
    while flushed < total {
        let end = {
            let mut state = monitor.lock();
            while state.completed < state.watermark && state.failure.is_none() {
                state = monitor
                    .batch
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if let Some(err) = state.failure.take() {
                return Err(err);
            }
            state.watermark
        };

        reports.clear();
        for id in flushed..end {
            let slot = slots[id % batch_size]
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(report) = slot {
                reports.push(report);
            }
        }
        if let Err(err) = sink.write_batch(&reports) {
            error!(
                "Could not write the results of spectra {}..{}, the results file may be incomplete: {}",
                flushed, end, err
            );
            return Err(err);
        }
        debug!("Flushed spectra {}..{}", flushed, end);
        flushed = end;

        let mut state = monitor.lock();
        state.watermark = (end + batch_size).min(total);
        monitor.work.notify_all();
    }
    Ok(())
}

/// Searches every spectrum of `spectra` with `params.threads` workers and
/// hands the reports to `sink` batch by batch. Returns the summed timings
/// of all workers.
pub fn run_search(
    spectra: &SpectrumCollection,
    proteins: &ProteinDatabase,
    table: &AminoAcidTable,
    params: &SearchParameters,
    sink: &mut dyn ReportSink,
) -> Result<PipelineTimings> {
    info!(
        "Searching {} spectra against {} proteins with {} threads",
        spectra.len(),
        proteins.len(),
        params.threads.clamp(1, spectra.len().max(1))
    );
    let (peaks, columns) = (spectra.max_native_peak_count(), spectra.max_column_count());
    run_workers(spectra, params.threads, params.batch_size, sink, || {
        let mut searcher = SpectrumSearcher::new(proteins, table, params);
        searcher.reserve(peaks, columns);
        searcher
    })
}

fn run_workers<W, F>(
    spectra: &SpectrumCollection,
    threads: usize,
    batch_size: usize,
    sink: &mut dyn ReportSink,
    make_worker: F,
) -> Result<PipelineTimings>
where
    W: SearchWorker + Send,
    F: Fn() -> W,
{
    let total = spectra.len();
    let batch_size = batch_size.max(1);
    let threads = threads.clamp(1, total.max(1));

    let monitor = Monitor {
        state: Mutex::new(Dispatch {
            next: 0,
            watermark: batch_size.min(total),
            completed: 0,
            aborted: false,
            failure: None,
        }),
        work: Condvar::new(),
        batch: Condvar::new(),
    };
    let slots: Vec<Mutex<Option<SpectrumReport>>> =
        (0..batch_size).map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let worker = make_worker();
                let (monitor, slots) = (&monitor, &slots);
                scope.spawn(move || run_worker(monitor, slots, spectra, worker))
            })
            .collect();

        let outcome = coordinate(&monitor, &slots, total, sink);
        if outcome.is_err() {
            monitor.abort();
        }

        let mut timings = PipelineTimings::default();
        for handle in handles {
            match handle.join() {
                Ok(worker_timings) => timings += worker_timings,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        outcome.map(|_| timings)
    })
}
