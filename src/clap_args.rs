use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Verbose mode (-v, --verbose)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a benchmark sweep
    Run {
        /// Path to the provbench config file
        #[arg(short, long, default_value = "./provbench.toml")]
        config: PathBuf,

        /// Workload to benchmark
        #[arg(short, long, value_enum)]
        workload: WorkloadKind,

        /// Output CSV path (defaults to provbench_<workload>_<timestamp>.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write an example config file into the current directory
    Init,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    BindMount,
    FileCopy,
    Pvc,
}

impl WorkloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::BindMount => "bind-mount",
            WorkloadKind::FileCopy => "file-copy",
            WorkloadKind::Pvc => "pvc",
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
