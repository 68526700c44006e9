use chrono::Utc;
use colored::Colorize;
use provbench::{
    clap_args::{self, Commands, WorkloadKind},
    config::{self, Config, SweepConfig},
    report::CsvReporter,
    sweep,
    workload::{bind_mount::BindMount, file_copy::FileCopy, pvc::Pvc, Workload},
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = clap_args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match args.command {
        Commands::Init => config::init_config(),

        Commands::Run {
            config,
            workload,
            output,
        } => {
            let config = Config::try_from_path(&config)?;
            // invalid sweep parameters abort before any trial runs
            config.sweep.validate()?;

            let output = output.unwrap_or_else(|| default_output_path(workload));
            match workload {
                WorkloadKind::BindMount => {
                    run(&BindMount::new(&config.bind_mount), &config.sweep, &output).await
                }
                WorkloadKind::FileCopy => {
                    run(&FileCopy::new(&config.file_copy), &config.sweep, &output).await
                }
                WorkloadKind::Pvc => run(&Pvc::new(&config.pvc), &config.sweep, &output).await,
            }
        }
    }
}

async fn run<W: Workload>(workload: &W, config: &SweepConfig, output: &Path) -> anyhow::Result<()> {
    let mut reporter = CsvReporter::create(output, workload.size_field())?;
    sweep::run_sweep(workload, config, &mut reporter).await?;
    println!(
        "{} {}",
        "results written to".green(),
        reporter.path().display()
    );
    Ok(())
}

fn default_output_path(workload: WorkloadKind) -> PathBuf {
    PathBuf::from(format!(
        "provbench_{}_{}.csv",
        workload.as_str(),
        Utc::now().format("%Y%m%d-%H%M%S")
    ))
}
