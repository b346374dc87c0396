pub mod alignment;
pub mod errors;
pub mod io;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod scheduler;
pub mod transform;

pub use alignment::{
    Alignment,
    RenderedAlignment,
};
pub use errors::{
    Result,
    SpecGlobError,
};
pub use models::{
    AminoAcidTable,
    NativeSpectrum,
    Protein,
    ProteinDatabase,
    RawSpectrum,
    SpectrumCollection,
};
pub use params::{
    CoarseStrategy,
    PeakFilter,
    SearchParameters,
};
pub use pipeline::{
    PipelineTimings,
    SpectrumReport,
    SpectrumSearcher,
};
pub use scheduler::{
    ReportSink,
    run_search,
};
pub use transform::TransformedSpectrum;
