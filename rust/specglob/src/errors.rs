use std::path::PathBuf;

#[derive(Debug)]
pub enum DataProcessingError {
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    BrokenBackpointer {
        row: usize,
        column: usize,
        context: String,
    },
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::IndexOutOfBounds {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::BrokenBackpointer {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

#[derive(Debug)]
pub enum SpecGlobError {
    Config {
        msg: String,
    },
    InputNotFound {
        path: PathBuf,
    },
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    ParseError {
        msg: String,
    },
    DataProcessing(DataProcessingError),
    /// A worker panicked; `msg` is the panic payload when it was a string.
    Panic {
        msg: String,
    },
    WorkerFault {
        spectrum_id: Option<usize>,
        source: Box<SpecGlobError>,
    },
}

impl std::fmt::Display for SpecGlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecGlobError::Config { msg } => write!(f, "Invalid configuration: {}", msg),
            SpecGlobError::InputNotFound { path } => {
                write!(f, "Input file not found: {}", path.display())
            }
            SpecGlobError::Io { source, path } => match path {
                Some(path) => write!(f, "I/O error on {}: {}", path.display(), source),
                None => write!(f, "I/O error: {}", source),
            },
            SpecGlobError::ParseError { msg } => write!(f, "Parse error: {}", msg),
            SpecGlobError::DataProcessing(x) => write!(f, "Data processing error: {:?}", x),
            SpecGlobError::Panic { msg } => write!(f, "Panicked: {}", msg),
            SpecGlobError::WorkerFault {
                spectrum_id,
                source,
            } => match spectrum_id {
                Some(id) => write!(f, "Worker failed on spectrum {}: {}", id, source),
                None => write!(f, "Worker failed: {}", source),
            },
        }
    }
}

impl std::error::Error for SpecGlobError {}

pub type Result<T> = std::result::Result<T, SpecGlobError>;

impl SpecGlobError {
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config {
            msg: msg.to_string(),
        }
    }

    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Self::ParseError {
            msg: msg.to_string(),
        }
    }

    pub fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}

impl From<std::io::Error> for SpecGlobError {
    fn from(x: std::io::Error) -> Self {
        Self::Io {
            source: x,
            path: None,
        }
    }
}

impl From<std::num::ParseIntError> for SpecGlobError {
    fn from(x: std::num::ParseIntError) -> Self {
        Self::ParseError { msg: x.to_string() }
    }
}

impl From<std::num::ParseFloatError> for SpecGlobError {
    fn from(x: std::num::ParseFloatError) -> Self {
        Self::ParseError { msg: x.to_string() }
    }
}

impl From<serde_json::Error> for SpecGlobError {
    fn from(val: serde_json::Error) -> Self {
        SpecGlobError::ParseError {
            msg: val.to_string(),
        }
    }
}

impl From<csv::Error> for SpecGlobError {
    fn from(x: csv::Error) -> Self {
        match x.into_kind() {
            csv::ErrorKind::Io(e) => Self::Io {
                source: e,
                path: None,
            },
            other => Self::ParseError {
                msg: format!("{:?}", other),
            },
        }
    }
}

impl From<DataProcessingError> for SpecGlobError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}
