//! The `lumen config` command for configuration management.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use lumen_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "LUMEN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration, or one table of it
    Show {
        /// Only print this table
        #[arg(value_enum)]
        section: Option<Section>,
    },

    /// Show config file path
    Path,

    /// Validate the configuration and report where a run would read from
    Check,

    /// Write a config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Top-level tables of the config file.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Section {
    /// `[scheduler]`: mode, worker count, data directories
    Scheduler,
    /// `[paths]`: input/output roots and the effects file
    Paths,
    /// `[pipeline]`: channel buffers, sink count, deque capacity, steal backoff
    Pipeline,
    /// `[logging]`: level and format
    Logging,
}

impl Section {
    fn table(self) -> &'static str {
        match self {
            Section::Scheduler => "scheduler",
            Section::Paths => "paths",
            Section::Pipeline => "pipeline",
            Section::Logging => "logging",
        }
    }
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    let path = args.config.clone().unwrap_or_else(Config::default_path);

    match args.command {
        ConfigCommand::Show { section } => {
            let toml = load(&path)?.to_toml()?;
            match section {
                Some(section) => match extract_table(&toml, section.table()) {
                    Some(table) => println!("{}", table),
                    None => anyhow::bail!("No [{}] table in configuration", section.table()),
                },
                None => println!("{}", toml),
            }
        }

        ConfigCommand::Path => {
            println!("{}", path.display());
        }

        ConfigCommand::Check => {
            let config = load(&path)?;
            println!(
                "mode: {}, workers: {}, sinks: {}",
                config.scheduler.mode, config.scheduler.workers, config.pipeline.sink_count
            );
            let effects = config.paths.effects_file();
            println!("{} {}", marker(&effects), effects.display());
            for data_dir in &config.scheduler.data_dirs {
                let input = config.paths.input_dir(data_dir);
                println!("{} {}", marker(&input), input.display());
            }
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, Config::default().to_toml()?)?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

/// Defaults when `path` does not exist, otherwise the validated file.
fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        Ok(Config::load_from(path)?)
    } else {
        Ok(Config::default())
    }
}

fn marker(path: &Path) -> &'static str {
    if path.exists() {
        "ok     "
    } else {
        "missing"
    }
}

/// The `[name]` table of a serialized config, header included.
fn extract_table(toml: &str, name: &str) -> Option<String> {
    let header = format!("[{name}]");
    let mut lines = toml.lines().skip_while(|line| line.trim() != header);
    let first = lines.next()?;
    let body: Vec<&str> = lines
        .take_while(|line| !line.trim_start().starts_with('['))
        .collect();
    Some(
        std::iter::once(first)
            .chain(body)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string(),
    )
}
