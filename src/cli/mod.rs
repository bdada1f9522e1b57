use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::preprocess::AlphabetPolicy;

#[derive(Parser, Debug)]
#[command(name = "dspd-predictor")]
#[command(about = "DSPD mutation prediction service for nucleotide sequences", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Service config file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP prediction service
    Serve(ServeArgs),

    /// Predict a single file and print the JSON result
    Predict(PredictArgs),

    /// Encode a sequence file into an NPZ container
    ExportNpz(ExportArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (default: 0.0.0.0:5000)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Local model file; overrides the configured model source
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Exit instead of serving stand-in predictions when the model fails to load
    #[arg(long)]
    pub require_model: bool,

    /// Encoded sequence length
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Encoding alphabet
    #[arg(long, value_enum)]
    pub alphabet: Option<AlphabetPolicy>,
}

#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Sequence text file or NPZ container
    #[arg(short, long)]
    pub file: PathBuf,

    /// Local model file; overrides the configured model source
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// FASTA or plain sequence file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination NPZ file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Encoded sequence length
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Encoding alphabet
    #[arg(long, value_enum)]
    pub alphabet: Option<AlphabetPolicy>,
}
