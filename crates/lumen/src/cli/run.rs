//! The `lumen run` command: filter every task of the selected data directories.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, ValueEnum};
use lumen_core::{Config, Mode, PngCodec, RunSummary};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Data directories to process, joined with '+' (e.g. small+big)
    #[arg(required = true)]
    pub data_dirs: String,

    /// Scheduling strategy (overrides the config file)
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Number of pipeline workers (overrides the config file)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Config file to use instead of the default location
    #[arg(short, long, env = "LUMEN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Strategy names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// One task at a time on the main thread
    #[value(alias = "s")]
    Sequential,
    /// Generator, work-stealing workers and sinks
    #[value(alias = "p")]
    Pipeline,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Sequential => Mode::Sequential,
            ModeArg::Pipeline => Mode::Pipeline,
        }
    }
}

/// Layer command-line values over `config` and re-validate.
pub fn apply_overrides(mut config: Config, args: &RunArgs) -> anyhow::Result<Config> {
    config.scheduler.data_dirs = Config::parse_data_dirs(&args.data_dirs);
    if let Some(mode) = args.mode {
        config.scheduler.mode = mode.into();
    }
    if let Some(workers) = args.workers {
        config.scheduler.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

/// Execute the run command.
pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };
    let config = apply_overrides(config, &args)?;

    let summary = tokio::task::spawn_blocking(move || lumen_core::run(&config, Arc::new(PngCodec)))
        .await
        .context("Run thread panicked")??;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Tasks:        {:>8}", summary.tasks_generated);
    eprintln!("    Saved:        {:>8}", summary.images_saved);
    if summary.tasks_failed > 0 {
        eprintln!("    Load failed:  {:>8}", summary.tasks_failed);
    }
    if summary.saves_failed > 0 {
        eprintln!("    Save failed:  {:>8}", summary.saves_failed);
    }
    if summary.tasks_stranded > 0 {
        eprintln!("    Stranded:     {:>8}", summary.tasks_stranded);
    }
    if summary.steals > 0 {
        eprintln!("    Steals:       {:>8}", summary.steals);
    }
    eprintln!("  ====================================");
    println!("{:.6}", summary.elapsed.as_secs_f64());
}
