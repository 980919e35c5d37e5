//! Task generation from the task-description stream.
//!
//! The stream is a sequence of JSON objects (`{"inPath", "outPath",
//! "effects"}`), one per task. It is re-read from the start for every data
//! directory, in configuration order, and each record's paths are resolved
//! against that directory.

use std::fs::File;
use std::io::{BufReader, Read};

use crossbeam_channel::Sender;

use crate::config::{Config, PathsConfig};
use crate::error::PipelineError;
use crate::types::{ImageTask, TaskRecord};

/// Produces [`ImageTask`]s for an ordered list of data directories.
#[derive(Debug, Clone)]
pub struct TaskSource {
    paths: PathsConfig,
    data_dirs: Vec<String>,
}

impl TaskSource {
    /// Create a source over `data_dirs`, in order.
    pub fn new(paths: PathsConfig, data_dirs: Vec<String>) -> Self {
        Self { paths, data_dirs }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.paths.clone(), config.scheduler.data_dirs.clone())
    }

    /// Data directories in generation order.
    pub fn data_dirs(&self) -> &[String] {
        &self.data_dirs
    }

    /// Feed every task to `emit` until the directories are exhausted or
    /// `emit` returns `false`. Returns the number of tasks emitted.
    ///
    /// A directory whose stream cannot be opened or decoded is logged and
    /// skipped from the failing record on; later directories still run.
    pub fn for_each_task<F>(&self, mut emit: F) -> u64
    where
        F: FnMut(ImageTask) -> bool,
    {
        let mut emitted = 0;
        for data_dir in &self.data_dirs {
            let file = match File::open(self.paths.effects_file()) {
                Ok(file) => file,
                Err(e) => {
                    let err = PipelineError::TaskStream {
                        data_dir: data_dir.clone(),
                        message: format!("Cannot open {:?}: {}", self.paths.effects_file(), e),
                    };
                    tracing::error!("{}", err);
                    continue;
                }
            };

            let mut dir_count = 0u64;
            for task in self.decode_dir(BufReader::new(file), data_dir) {
                match task {
                    Ok(task) => {
                        if !emit(task) {
                            tracing::debug!("Task consumer closed, stopping generation");
                            return emitted + dir_count;
                        }
                        dir_count += 1;
                    }
                    Err(err) => {
                        tracing::error!("{}", err);
                        break;
                    }
                }
            }
            tracing::debug!(data_dir = %data_dir, tasks = dir_count, "Data directory exhausted");
            emitted += dir_count;
        }
        emitted
    }

    /// Generator stage: send every task on `sender`, then close it by dropping it.
    ///
    /// Blocks whenever the channel is full.
    pub fn run(&self, sender: Sender<ImageTask>) -> u64 {
        let emitted = self.for_each_task(|task| sender.send(task).is_ok());
        drop(sender);
        tracing::debug!(tasks = emitted, "Task generation complete, channel closed");
        emitted
    }

    /// Decode one pass over `reader` into tasks resolved for `data_dir`.
    ///
    /// Yields at most one error, after which the iterator ends.
    pub fn decode_dir<'a, R: Read + 'a>(
        &'a self,
        reader: R,
        data_dir: &'a str,
    ) -> impl Iterator<Item = Result<ImageTask, PipelineError>> + 'a {
        let mut records = serde_json::Deserializer::from_reader(reader).into_iter::<TaskRecord>();
        let mut failed = false;
        std::iter::from_fn(move || {
            if failed {
                return None;
            }
            match records.next()? {
                Ok(record) => Some(Ok(self.resolve(record, data_dir))),
                Err(e) => {
                    failed = true;
                    Some(Err(PipelineError::TaskStream {
                        data_dir: data_dir.to_string(),
                        message: e.to_string(),
                    }))
                }
            }
        })
    }

    fn resolve(&self, record: TaskRecord, data_dir: &str) -> ImageTask {
        ImageTask::new(
            self.paths.resolve_input(data_dir, &record.in_path),
            self.paths.resolve_output(data_dir, &record.out_path),
            record.effects,
            data_dir,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::bounded_channel;
    use crate::types::Effect;
    use std::path::{Path, PathBuf};

    const STREAM: &str = r#"{"inPath": "a.png", "outPath": "a_out.png", "effects": ["G"]}
{"inPath": "b.png", "outPath": "b_out.png", "effects": ["S", "B"]}
"#;

    fn source_with(dir: &Path, stream: &str, data_dirs: &[&str]) -> TaskSource {
        let effects_file = dir.join("effects.txt");
        std::fs::write(&effects_file, stream).unwrap();
        TaskSource::new(
            PathsConfig {
                input_root: PathBuf::from("/in"),
                output_root: PathBuf::from("/out"),
                effects_file,
            },
            data_dirs.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[test]
    fn test_rereads_stream_per_directory_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(dir.path(), STREAM, &["small", "big"]);

        let mut tasks = Vec::new();
        let emitted = source.for_each_task(|t| {
            tasks.push(t);
            true
        });

        assert_eq!(emitted, 4);
        let dirs: Vec<_> = tasks.iter().map(|t| t.data_dir.as_str()).collect();
        assert_eq!(dirs, vec!["small", "small", "big", "big"]);
        assert_eq!(tasks[0].in_path, PathBuf::from("/in/small/a.png"));
        assert_eq!(tasks[3].out_path, PathBuf::from("/out/big_b_out.png"));
        assert_eq!(tasks[3].effects, vec![Effect::Sharpen, Effect::Blur]);
        assert!(tasks.iter().all(|t| t.processed.is_none()));
    }

    #[test]
    fn test_decode_error_stops_only_that_directory_pass() {
        let dir = tempfile::tempdir().unwrap();
        let stream = format!("{STREAM}{{\"inPath\": \"c.png\", \"outPath\": 5}}\n{STREAM}");
        let source = source_with(dir.path(), &stream, &["small", "big"]);

        let mut tasks = Vec::new();
        source.for_each_task(|t| {
            tasks.push(t);
            true
        });

        // two good records before the bad one, for each directory
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[2].data_dir, "big");
    }

    #[test]
    fn test_missing_stream_skips_directories() {
        let source = TaskSource::new(
            PathsConfig {
                effects_file: PathBuf::from("/nonexistent/effects.txt"),
                ..PathsConfig::default()
            },
            vec!["small".to_string()],
        );
        assert_eq!(source.for_each_task(|_| true), 0);
    }

    #[test]
    fn test_run_closes_channel_when_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(dir.path(), STREAM, &["small"]);
        let (tx, rx) = bounded_channel(1);

        let generator = std::thread::spawn(move || source.run(tx));
        let received: Vec<_> = rx.iter().collect();
        assert_eq!(generator.join().unwrap(), 2);
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn test_stops_when_consumer_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(dir.path(), STREAM, &["small", "big"]);
        let mut seen = 0;
        let emitted = source.for_each_task(|_| {
            seen += 1;
            seen < 3
        });
        assert_eq!(seen, 3);
        assert_eq!(emitted, 2);
    }

    #[test]
    fn test_decode_dir_ends_cleanly_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_with(dir.path(), "", &["small"]);
        let tasks: Vec<_> = source.decode_dir(STREAM.as_bytes(), "small").collect();
        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.is_ok()));
    }
}
