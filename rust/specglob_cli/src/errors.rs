use specglob::SpecGlobError;

#[derive(Debug)]
pub enum CliError {
    Config {
        source: String,
    },
    ParseError {
        msg: String,
    },
    Io {
        source: String,
        path: Option<String>,
    },
    Search {
        source: String,
    },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing config: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::Search { source } => write!(f, "Error during the search: {}", source),
        }
    }
}

impl From<SpecGlobError> for CliError {
    fn from(e: SpecGlobError) -> Self {
        match e {
            SpecGlobError::Config { msg } => CliError::Config { source: msg },
            SpecGlobError::InputNotFound { path } => CliError::Io {
                source: "file not found".to_string(),
                path: Some(path.to_string_lossy().to_string()),
            },
            SpecGlobError::Io { source, path } => CliError::Io {
                source: source.to_string(),
                path: path.map(|p| p.to_string_lossy().to_string()),
            },
            other => CliError::Search {
                source: other.to_string(),
            },
        }
    }
}
