//! Scheduling strategies and their building blocks.
//!
//! This module contains every stage of the filter engine:
//! - **deque**: Bounded lock-free work-stealing deque of task handles
//! - **arena**: Owner of the tasks referenced from the deques
//! - **executor**: Row-chunked effect passes with a barrier between passes
//! - **source**: Task-description stream per data directory
//! - **worker**: Work-stealing workers and their pool
//! - **sink**: Concurrent result savers
//! - **channel**: Bounded channels for backpressure
//! - **sequential** / **run**: The two strategies and the dispatcher

pub mod arena;
pub mod channel;
pub mod deque;
pub mod executor;
pub mod run;
pub mod sequential;
pub mod sink;
pub mod source;
pub mod worker;

// Re-exports for convenient access
pub use arena::TaskArena;
pub use channel::{bounded_channel, result_channel, task_channel};
pub use deque::{ConcurrentDeque, StampedIndex, TaskHandle};
pub use executor::EffectExecutor;
pub use run::{run, run_pipeline};
pub use sequential::run_sequential;
pub use sink::{ResultSink, SinkPool, SinkStats};
pub use source::TaskSource;
pub use worker::{
    PoolReport, Worker, WorkerOutcome, WorkerPool, WorkerShared, WorkerState, WorkerStats,
};
