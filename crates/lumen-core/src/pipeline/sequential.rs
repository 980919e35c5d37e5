//! Single-threaded strategy: one task at a time on the calling thread.

use std::time::Instant;

use super::executor::EffectExecutor;
use super::source::TaskSource;
use crate::codec::ImageCodec;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::types::RunSummary;

/// Process every task in stream order without deques or extra threads.
///
/// A load failure skips the task. The first save failure stops the run and
/// is returned.
pub fn run_sequential(config: &Config, codec: &dyn ImageCodec) -> Result<RunSummary> {
    let start = Instant::now();
    let executor = EffectExecutor::new(1);
    let source = TaskSource::from_config(config);

    let mut summary = RunSummary::default();
    let mut fatal: Option<PipelineError> = None;

    let generated = source.for_each_task(|task| {
        let image = match codec.load(&task.in_path) {
            Ok(image) => image,
            Err(e) => {
                summary.tasks_failed += 1;
                tracing::error!("Skipping task: {}", e);
                return true;
            }
        };

        let output = executor.apply_chain(image, &task.effects);
        summary.tasks_processed += 1;
        tracing::debug!(path = ?task.in_path, effects = %task.effect_codes(), "Processed task");

        match codec.save(&output, &task.out_path) {
            Ok(()) => {
                summary.images_saved += 1;
                true
            }
            Err(e) => {
                fatal = Some(e);
                false
            }
        }
    });
    summary.tasks_generated = generated;

    if let Some(e) = fatal {
        tracing::error!("Sequential run aborted: {}", e);
        return Err(e.into());
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}
