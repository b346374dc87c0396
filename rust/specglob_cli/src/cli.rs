use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file, JSON or legacy `key = value`
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the FASTA protein file (will over-write the config file)
    #[arg(short, long)]
    pub proteins: Option<PathBuf>,

    /// Path to the MGF spectra file (will over-write the config file)
    #[arg(short, long)]
    pub spectra: Option<PathBuf>,

    /// Path to the output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Number of search threads (will over-write the config file)
    #[arg(short, long)]
    pub threads: Option<usize>,
}
