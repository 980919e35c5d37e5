//! Bounded channels for backpressure between pipeline stages.
//!
//! The task channel is drained by every worker and the result channel by every
//! sink, so both are multi-consumer `crossbeam_channel` queues. Senders block
//! while a channel is full; dropping the last sender is the close signal.

use crossbeam_channel::{Receiver, Sender};

use crate::config::Config;
use crate::types::{ImageResult, ImageTask};

/// Create a bounded channel pair holding at most `capacity` items.
///
/// A zero capacity is raised to one so the channel still buffers.
pub fn bounded_channel<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    crossbeam_channel::bounded(capacity.max(1))
}

/// Generator → workers channel, sized from the configuration.
pub fn task_channel(config: &Config) -> (Sender<ImageTask>, Receiver<ImageTask>) {
    bounded_channel(config.pipeline.task_capacity(config.scheduler.workers))
}

/// Workers → sinks channel, sized from the configuration.
pub fn result_channel(config: &Config) -> (Sender<ImageResult>, Receiver<ImageResult>) {
    bounded_channel(config.pipeline.result_capacity(config.scheduler.workers))
}
