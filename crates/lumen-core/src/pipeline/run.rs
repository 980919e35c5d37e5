//! Strategy dispatch and the pipelined run.
//!
//! ```text
//! generator ──task channel──▶ workers (steal network) ──result channel──▶ sinks ──▶ codec
//! ```
//!
//! Shutdown cascades through channel closes: the generator drops the task
//! sender when the stream is exhausted, every worker drains its deque and
//! drops its result sender, and the sinks stop once the result channel is
//! empty and closed.

use std::sync::Arc;
use std::time::Instant;

use super::channel::{result_channel, task_channel};
use super::sequential::run_sequential;
use super::sink::SinkPool;
use super::source::TaskSource;
use super::worker::WorkerPool;
use crate::codec::ImageCodec;
use crate::config::{Config, Mode};
use crate::error::{PipelineError, Result};
use crate::types::RunSummary;

/// Validate `config` and run the strategy it selects.
pub fn run(config: &Config, codec: Arc<dyn ImageCodec>) -> Result<RunSummary> {
    config.validate()?;
    tracing::info!(
        mode = %config.scheduler.mode,
        workers = config.scheduler.workers,
        data_dirs = ?config.scheduler.data_dirs,
        "Starting run"
    );
    let summary = match config.scheduler.mode {
        Mode::Sequential => run_sequential(config, codec.as_ref())?,
        Mode::Pipeline => run_pipeline(config, codec)?,
    };
    tracing::info!(
        generated = summary.tasks_generated,
        processed = summary.tasks_processed,
        failed = summary.tasks_failed,
        stranded = summary.tasks_stranded,
        saved = summary.images_saved,
        saves_failed = summary.saves_failed,
        steals = summary.steals,
        elapsed = ?summary.elapsed,
        "Run complete"
    );
    Ok(summary)
}

/// Generator, work-stealing worker pool and result sinks on dedicated threads.
///
/// Individual task failures and aborted workers are logged and counted; only
/// failing to start a thread is returned as an error.
pub fn run_pipeline(config: &Config, codec: Arc<dyn ImageCodec>) -> Result<RunSummary> {
    let start = Instant::now();
    let (task_tx, task_rx) = task_channel(config);
    let (result_tx, result_rx) = result_channel(config);

    let sinks = SinkPool::spawn(config.pipeline.sink_count, result_rx, Arc::clone(&codec))?;
    let workers = WorkerPool::spawn(config, task_rx, result_tx, codec)?;

    let source = TaskSource::from_config(config);
    let generator = std::thread::Builder::new()
        .name("lumen-generator".to_string())
        .spawn(move || source.run(task_tx))?;

    let mut summary = RunSummary::default();

    // workers first: if they all abort, joining the pool drains the task
    // channel and lets a blocked generator finish
    let report = workers.join();
    summary.tasks_stranded = report.stranded;
    for outcome in report.workers {
        match outcome {
            Ok(outcome) => {
                let stats = outcome.stats;
                summary.tasks_processed += stats.processed;
                summary.tasks_failed += stats.failed;
                summary.steals += stats.steals;
                tracing::debug!(
                    worker = stats.worker,
                    processed = stats.processed,
                    failed = stats.failed,
                    steals = stats.steals,
                    steal_attempts = stats.steal_attempts,
                    aborted = outcome.error.is_some(),
                    "Worker stats"
                );
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    match generator.join() {
        Ok(generated) => summary.tasks_generated = generated,
        Err(_) => tracing::error!("{}", PipelineError::GeneratorPanicked),
    }

    for outcome in sinks.join() {
        match outcome {
            Ok(stats) => {
                summary.images_saved += stats.saved;
                summary.saves_failed += stats.failed;
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryCodec;
    use crate::config::PathsConfig;
    use crate::error::PipelineResult;
    use crate::types::Rgba16Image;
    use image::Rgba;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn setup(dir: &std::path::Path, records: usize) -> (Config, Arc<MemoryCodec>) {
        let mut stream = String::new();
        for i in 0..records {
            stream.push_str(&format!(
                "{{\"inPath\": \"{i}.png\", \"outPath\": \"{i}.png\", \"effects\": [\"E\", \"G\"]}}\n"
            ));
        }
        let effects_file = dir.join("effects.txt");
        std::fs::write(&effects_file, stream).unwrap();

        let mut config = Config::default();
        config.paths = PathsConfig {
            input_root: PathBuf::from("/in"),
            output_root: PathBuf::from("/out"),
            effects_file,
        };
        config.scheduler.data_dirs = vec!["small".to_string(), "big".to_string()];

        let codec = Arc::new(MemoryCodec::new());
        for d in ["small", "big"] {
            for i in 0..records {
                codec.insert(
                    format!("/in/{d}/{i}.png"),
                    Rgba16Image::from_pixel(6, 5, Rgba([i as u16 * 100, 5, 9, 7])),
                );
            }
        }
        (config, codec)
    }

    #[test]
    fn test_pipeline_saves_every_task_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, codec) = setup(dir.path(), 40);
        config.scheduler.workers = 4;
        config.pipeline.sink_count = 3;

        let summary = run(&config, codec.clone()).unwrap();
        assert_eq!(summary.tasks_generated, 80);
        assert_eq!(summary.tasks_processed, 80);
        assert_eq!(summary.images_saved, 80);
        assert_eq!(summary.tasks_failed, 0);

        let saved: HashSet<_> = codec.saved().into_iter().map(|(p, _)| p).collect();
        assert_eq!(saved.len(), 80);
        assert!(saved.contains(&PathBuf::from("/out/big_39.png")));
    }

    #[test]
    fn test_pipeline_drops_unloadable_tasks_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, codec) = setup(dir.path(), 5);
        config.scheduler.data_dirs.push("ghost".to_string());

        let summary = run(&config, codec.clone()).unwrap();
        assert_eq!(summary.tasks_generated, 15);
        assert_eq!(summary.tasks_failed, 5);
        assert_eq!(summary.images_saved, 10);
    }

    #[test]
    fn test_pipeline_save_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (config, codec) = setup(dir.path(), 3);
        codec.fail_saves_to("/out/small_1.png");

        let summary = run(&config, codec.clone()).unwrap();
        assert_eq!(summary.tasks_processed, 6);
        assert_eq!(summary.images_saved, 5);
        assert_eq!(summary.saves_failed, 1);
        assert_eq!(summary.tasks_failed, 0);
    }

    /// Sleeps on the first load so the task channel fills up behind it.
    struct SlowFirstLoad {
        inner: Arc<MemoryCodec>,
        first: AtomicBool,
    }

    impl ImageCodec for SlowFirstLoad {
        fn load(&self, path: &Path) -> PipelineResult<Rgba16Image> {
            if self.first.swap(false, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(150));
            }
            self.inner.load(path)
        }

        fn save(&self, image: &Rgba16Image, path: &Path) -> PipelineResult<()> {
            self.inner.save(image, path)
        }
    }

    #[test]
    fn test_summary_accounts_for_tasks_stranded_by_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, memory) = setup(dir.path(), 40);
        config.scheduler.workers = 1;
        config.pipeline.deque_capacity = 2;
        config.pipeline.task_buffer = 16;
        let codec = Arc::new(SlowFirstLoad {
            inner: Arc::clone(&memory),
            first: AtomicBool::new(true),
        });

        let summary = run(&config, codec).unwrap();
        assert_eq!(summary.tasks_generated, 80);
        assert_eq!(
            summary.tasks_processed + summary.tasks_failed + summary.tasks_stranded,
            summary.tasks_generated
        );
        assert!(summary.tasks_stranded >= 79, "{summary:?}");
        assert_eq!(summary.images_saved + summary.saves_failed, summary.tasks_processed);
        assert_eq!(memory.save_count() as u64, summary.images_saved);
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let mut config = Config::default();
        config.scheduler.workers = 0;
        assert!(run(&config, Arc::new(MemoryCodec::new())).is_err());
    }

    #[test]
    fn test_modes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, codec) = setup(dir.path(), 6);
        config.scheduler.mode = Mode::Sequential;
        run(&config, codec.clone()).unwrap();
        let mut sequential = codec.saved();
        sequential.sort_by(|a, b| a.0.cmp(&b.0));

        for workers in [1, 3] {
            let (mut config, codec) = setup(dir.path(), 6);
            config.scheduler.mode = Mode::Pipeline;
            config.scheduler.workers = workers;
            run(&config, codec.clone()).unwrap();
            let mut pipelined = codec.saved();
            pipelined.sort_by(|a, b| a.0.cmp(&b.0));
            assert_eq!(pipelined, sequential, "{workers} workers diverged");
        }
    }
}
