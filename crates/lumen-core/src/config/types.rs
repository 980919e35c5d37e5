//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Execution strategy selected by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One task at a time on the calling thread, no deques
    #[serde(alias = "s")]
    Sequential,
    /// Generator, work-stealing worker pool and result sinks
    #[default]
    Pipeline,
}

impl Mode {
    /// Parse a mode name (case-insensitive). `s` is accepted for sequential.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s" | "seq" | "sequential" => Some(Self::Sequential),
            "pipeline" | "p" => Some(Self::Pipeline),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Sequential => write!(f, "sequential"),
            Mode::Pipeline => write!(f, "pipeline"),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Execution strategy
    pub mode: Mode,

    /// Worker count; also the number of row chunks per effect pass
    pub workers: usize,

    /// Data directories, processed in this order
    pub data_dirs: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Pipeline,
            workers: 4,
            data_dirs: vec!["small".to_string()],
        }
    }
}

/// Filesystem roots for inputs, outputs and the task-description stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root holding one sub-directory per data directory
    pub input_root: PathBuf,

    /// Root that receives `<data_dir>_<name>` output files
    pub output_root: PathBuf,

    /// Task-description stream, re-read once per data directory
    pub effects_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("../data/in"),
            output_root: PathBuf::from("../data/out"),
            effects_file: PathBuf::from("../data/effects.txt"),
        }
    }
}

impl PathsConfig {
    /// `<input_root>/<data_dir>/<record_path>`
    ///
    /// A leading root or drive prefix on `record_path` is ignored, so an
    /// absolute record path still lands under the data directory.
    pub fn resolve_input(&self, data_dir: &str, record_path: &Path) -> PathBuf {
        self.input_dir(data_dir).join(strip_root(record_path))
    }

    /// `<input_root>/<data_dir>` with `~` expanded.
    pub fn input_dir(&self, data_dir: &str) -> PathBuf {
        expand(&self.input_root).join(data_dir)
    }

    /// `<output_root>/<data_dir>_<record_path>`
    pub fn resolve_output(&self, data_dir: &str, record_path: &Path) -> PathBuf {
        let name = format!("{}_{}", data_dir, record_path.to_string_lossy());
        expand(&self.output_root).join(name)
    }

    /// The task-description file with `~` expanded.
    pub fn effects_file(&self) -> PathBuf {
        expand(&self.effects_file)
    }
}

fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect()
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

/// Channel, deque and sink sizing for the pipelined strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Task channel capacity; 0 means "same as the worker count"
    pub task_buffer: usize,

    /// Result channel capacity; 0 means "same as the worker count"
    pub result_buffer: usize,

    /// Number of concurrent result sinks
    pub sink_count: usize,

    /// Slots per worker deque (power of two)
    pub deque_capacity: usize,

    /// Upper bound on the idle wait after a failed steal, in microseconds
    pub steal_backoff_max_us: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            task_buffer: 0,
            result_buffer: 0,
            sink_count: 2,
            deque_capacity: 1 << 16,
            steal_backoff_max_us: 1000,
        }
    }
}

impl PipelineConfig {
    /// Effective task channel capacity for `workers` workers.
    pub fn task_capacity(&self, workers: usize) -> usize {
        if self.task_buffer == 0 {
            workers
        } else {
            self.task_buffer
        }
    }

    /// Effective result channel capacity for `workers` workers.
    pub fn result_capacity(&self, workers: usize) -> usize {
        if self.result_buffer == 0 {
            workers
        } else {
            self.result_buffer
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
