//! Error types for the Lumen filter engine.
//!
//! Errors are grouped by concern so that log lines carry the path or data
//! directory they relate to. Inside the pipelined scheduler most of these are
//! logged and the affected task dropped; only the sequential strategy and the
//! driver propagate them to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Lumen operations.
#[derive(Error, Debug)]
pub enum LumenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while moving tasks through the scheduler.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Loading the source image failed
    #[error("Load error for {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Saving the processed image failed
    #[error("Save error for {path}: {message}")]
    Save { path: PathBuf, message: String },

    /// The task-description stream could not be opened or decoded
    #[error("Task stream error in data dir '{data_dir}': {message}")]
    TaskStream { data_dir: String, message: String },

    /// A worker's deque refused a task
    #[error("Deque error: {0}")]
    Deque(#[from] DequeError),

    /// The task generator thread panicked
    #[error("Task generator panicked")]
    GeneratorPanicked,

    /// A worker thread panicked instead of returning
    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    /// A sink thread panicked instead of returning
    #[error("Result sink {sink} panicked")]
    SinkPanicked { sink: usize },

    /// A result was built from a task that was never processed
    #[error("Task for {path} has no processed image")]
    Incomplete { path: PathBuf },
}

/// Errors returned by [`ConcurrentDeque`](crate::pipeline::ConcurrentDeque).
///
/// Empty pops and lost steal races are not errors; they surface as `None`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeError {
    /// The fixed slot array is full
    #[error("deque capacity of {capacity} slots exceeded")]
    CapacityExceeded { capacity: usize },
}

/// Convenience type alias for Lumen results.
pub type Result<T> = std::result::Result<T, LumenError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
