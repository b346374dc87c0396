use serde::{
    Deserialize,
    Serialize,
};
use specglob::params::PeakFilter;
use specglob::{
    CoarseStrategy,
    SearchParameters,
};
use std::path::{
    Path,
    PathBuf,
};
use std::str::FromStr;
use tracing::warn;

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub analysis: SearchParameters,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct InputConfig {
    pub proteins: Option<PathBuf>,
    pub spectra: Option<PathBuf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Defaults to the spectra file stem with a `.csv` extension.
    #[serde(default)]
    pub results_file: Option<String>,
}

/// Everything a run needs, once the config and the flags are merged.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub proteins: PathBuf,
    pub spectra: PathBuf,
    pub output_dir: PathBuf,
    pub results_file: PathBuf,
    pub params: SearchParameters,
}

impl Config {
    /// Reads a JSON config when the file ends in `.json`, the legacy
    /// `key = value` format otherwise.
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let contents = std::fs::read_to_string(path).map_err(|e| CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        })?;
        let is_json = path
            .extension()
            .is_some_and(|x| x.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&contents).map_err(|e| CliError::ParseError { msg: e.to_string() })
        } else {
            Self::from_legacy(&contents)
        }
    }

    /// Parses the flat parameter file: one `key = value` per line, `%` starts
    /// a comment. Unknown keys are logged and ignored.
    pub fn from_legacy(contents: &str) -> Result<Self, CliError> {
        let mut params = SearchParameters::default();
        let mut paths = LegacyPaths::default();
        let mut filter_kind: Option<String> = None;
        let mut selected_peaks: Option<usize> = None;

        for (line_number, line) in contents.lines().enumerate() {
            let line = line.split('%').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("Ignoring line {} of the parameter file: {:?}", line_number + 1, line);
                continue;
            };
            let key = key.trim();
            let value = value.split_whitespace().next().unwrap_or_default();
            let entry = LegacyEntry {
                key,
                value,
                line: line_number + 1,
            };

            match key {
                "proteinsFolderPath" => paths.proteins_folder = Some(value.into()),
                "proteinsFile" => paths.proteins_file = Some(value.into()),
                "spectraFolderPath" => paths.spectra_folder = Some(value.into()),
                "spectraFile" => paths.spectra_file = Some(value.into()),
                "resultsFolderPath" => paths.results_folder = Some(value.into()),
                "resultsFile" => paths.results_file = Some(value.to_string()),
                "nbPeaksMin" => params.min_peaks = entry.parse()?,
                "nbMinAAFound" => params.min_amino_acid_hits = entry.parse()?,
                "usedFilter" => filter_kind = Some(value.to_string()),
                "nbSelectedPeaks" => selected_peaks = Some(entry.parse()?),
                "accuracy" => params.accuracy = entry.parse()?,
                "nbThreads" => params.threads = entry.parse()?,
                "tolPeakMissing" => params.max_realignment_size = entry.parse()?,
                "tolPeakMissingFirstCol" => {
                    params.max_realignment_size_first_column = entry.parse()?
                }
                "surplus" => params.surplus = entry.parse()?,
                "shutDown3PeaksVersion" => params.disable_three_peaks = entry.parse()?,
                "shutDownPeaksCleaning" => params.disable_peak_cleaning = entry.parse()?,
                "shutDownNonAlignedMass" => params.disable_non_aligned_mass = entry.parse()?,
                "versionPreliminaryTreatment" => {
                    params.coarse_strategy = match entry.parse::<u32>()? {
                        0 => {
                            warn!(
                                "Preliminary treatment version 0 is not available, using version 1"
                            );
                            CoarseStrategy::FirstColumnFastPath
                        }
                        1 => CoarseStrategy::FirstColumnFastPath,
                        2 => CoarseStrategy::ExhaustiveShift,
                        other => {
                            return Err(CliError::Config {
                                source: format!(
                                    "line {}: unknown preliminary treatment version {}",
                                    entry.line, other
                                ),
                            });
                        }
                    }
                }
                "nbResultsAtOnce" => params.batch_size = entry.parse()?,
                "nbLssSMSaved" => params.locations_saved = entry.parse()?,
                "nbResultsReturned" => params.interpretations_saved = entry.parse()?,
                "minScenarioScore" => params.min_scenario_score = entry.parse()?,
                "filterLssSMOnScore" => params.locations_score_threshold = entry.parse()?,
                "certainlyFoundMain" => params.main_scores.certainly_found = entry.parse()?,
                "foundMain" => params.main_scores.found = entry.parse()?,
                "certainlyFoundWithShiftMain" => {
                    params.main_scores.certainly_found_with_shift = entry.parse()?
                }
                "foundWithShiftMain" => params.main_scores.found_with_shift = entry.parse()?,
                "notFoundMain" => params.main_scores.not_found = entry.parse()?,
                "certainlyFoundPost" => params.post_scores.certainly_found = entry.parse()?,
                "foundPost" => params.post_scores.found = entry.parse()?,
                "certainlyFoundWithShiftPost" => {
                    params.post_scores.certainly_found_with_shift = entry.parse()?
                }
                "foundWithShiftPost" => params.post_scores.found_with_shift = entry.parse()?,
                "notFoundPost" => params.post_scores.not_found = entry.parse()?,
                "NTERModif" => params.modifications.n_term = entry.parse()?,
                "CTERModif" => params.modifications.c_term = entry.parse()?,
                _ => match residue_modification(key) {
                    Some(letter) => {
                        let mass: f64 = entry.parse()?;
                        if mass != 0.0 {
                            params.modifications.residues.insert(letter, mass);
                        }
                    }
                    None => warn!(
                        "Unknown key {:?} on line {} of the parameter file, ignored",
                        key,
                        line_number + 1
                    ),
                },
            }
        }

        params.peak_filter = match filter_kind.as_deref() {
            None | Some("mostIntense") | Some("MostIntense") => PeakFilter::MostIntense {
                count: selected_peaks.unwrap_or(60),
            },
            Some("keepAll") | Some("KeepAll") => PeakFilter::KeepAll,
            Some(other) => {
                return Err(CliError::Config {
                    source: format!("unknown peak filter {:?}", other),
                });
            }
        };

        Ok(Self {
            input: Some(InputConfig {
                proteins: paths.proteins(),
                spectra: paths.spectra(),
            }),
            analysis: params,
            output: paths.results_folder.map(|directory| OutputConfig {
                directory,
                results_file: paths.results_file,
            }),
        })
    }

    /// Applies the command-line overrides on top of the file values.
    pub fn with_cli_args(mut self, args: &Cli) -> Self {
        let input = self.input.get_or_insert_with(InputConfig::default);
        if let Some(proteins) = &args.proteins {
            input.proteins = Some(proteins.clone());
        }
        if let Some(spectra) = &args.spectra {
            input.spectra = Some(spectra.clone());
        }
        if let Some(output_dir) = &args.output_dir {
            let results_file = self.output.take().and_then(|x| x.results_file);
            self.output = Some(OutputConfig {
                directory: output_dir.clone(),
                results_file,
            });
        }
        if let Some(threads) = args.threads {
            self.analysis.threads = threads;
        }
        self
    }

    /// Checks that every input is present and validates the search parameters.
    pub fn resolve(self) -> Result<RunConfig, CliError> {
        let input = self.input.unwrap_or_default();
        let proteins = input.proteins.ok_or_else(|| CliError::Config {
            source: "No protein file provided, please provide one in either the config file or with the --proteins flag".to_string(),
        })?;
        let spectra = input.spectra.ok_or_else(|| CliError::Config {
            source: "No spectra file provided, please provide one in either the config file or with the --spectra flag".to_string(),
        })?;
        let output = self.output.ok_or_else(|| CliError::Config {
            source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
        })?;
        let results_file = match output.results_file {
            Some(name) => output.directory.join(name),
            None => {
                let stem = spectra
                    .file_stem()
                    .map(|x| x.to_string_lossy().to_string())
                    .unwrap_or_else(|| "results".to_string());
                output.directory.join(format!("{}.csv", stem))
            }
        };
        let params = self.analysis.validate()?;
        Ok(RunConfig {
            proteins,
            spectra,
            output_dir: output.directory,
            results_file,
            params,
        })
    }
}

#[derive(Debug, Default)]
struct LegacyPaths {
    proteins_folder: Option<PathBuf>,
    proteins_file: Option<PathBuf>,
    spectra_folder: Option<PathBuf>,
    spectra_file: Option<PathBuf>,
    results_folder: Option<PathBuf>,
    results_file: Option<String>,
}

impl LegacyPaths {
    fn join(folder: &Option<PathBuf>, file: &Option<PathBuf>) -> Option<PathBuf> {
        let file = file.as_ref()?;
        Some(match folder {
            Some(folder) => folder.join(file),
            None => file.clone(),
        })
    }

    fn proteins(&self) -> Option<PathBuf> {
        Self::join(&self.proteins_folder, &self.proteins_file)
    }

    fn spectra(&self) -> Option<PathBuf> {
        Self::join(&self.spectra_folder, &self.spectra_file)
    }
}

struct LegacyEntry<'a> {
    key: &'a str,
    value: &'a str,
    line: usize,
}

impl LegacyEntry<'_> {
    fn parse<T: FromStr>(&self) -> Result<T, CliError> {
        self.value.parse().map_err(|_| CliError::ParseError {
            msg: format!(
                "line {}: invalid value {:?} for {}",
                self.line, self.value, self.key
            ),
        })
    }
}

/// `GModif` -> `G`, for single-letter residue keys.
fn residue_modification(key: &str) -> Option<char> {
    let letter = key.strip_suffix("Modif")?;
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => Some(c),
        _ => None,
    }
}
