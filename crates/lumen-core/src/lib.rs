//! Lumen Core - Batch image filter engine.
//!
//! Lumen reads a stream of task descriptions (input path, output path and an
//! ordered chain of effect codes), applies the chain to each 16-bit RGBA image
//! and writes the results.
//!
//! # Architecture
//!
//! Two strategies share the same effects and codec:
//!
//! ```text
//! sequential: stream → load → effects → save, one task at a time
//! pipeline:   generator → workers (work-stealing deques) → sinks
//! ```
//!
//! Inside a worker every effect pass is split into row chunks that run in
//! parallel and meet at a barrier before the next pass starts.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lumen_core::{Config, PngCodec};
//!
//! fn main() -> lumen_core::Result<()> {
//!     let config = Config::load()?;
//!     let summary = lumen_core::run(&config, Arc::new(PngCodec))?;
//!     println!("Saved {} images", summary.images_saved);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod codec;
pub mod config;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod types;

// Re-exports for convenient access
pub use codec::{ImageCodec, MemoryCodec, PngCodec};
pub use config::{Config, Mode};
pub use error::{ConfigError, DequeError, LumenError, PipelineError, PipelineResult, Result};
pub use pipeline::{run, run_pipeline, run_sequential, ConcurrentDeque, EffectExecutor};
pub use types::{Effect, ImageResult, ImageTask, Rgba16Image, RunSummary, TaskRecord};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
