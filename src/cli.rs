use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pwcdb",
    version,
    about = "Papers-with-Code archive loader with checkpoint-based resume"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Load(LoadArgs),
    Stream(StreamArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    #[arg(long, default_value = "data/pwc-archive")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = 1000)]
    pub batch_size: usize,

    /// Discard any existing checkpoint before loading.
    #[arg(long, default_value_t = false)]
    pub fresh: bool,

    /// Resume from the last checkpoint (default behavior).
    #[arg(long = "continue", default_value_t = false)]
    pub continue_load: bool,

    /// Delete the checkpoint file and exit without loading.
    #[arg(long, default_value_t = false)]
    pub clear_checkpoint: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// JSON-Lines export of the evaluation-tables archive.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "data/pwc-archive")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    pub commit_every: usize,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data/pwc-archive")]
    pub data_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}
