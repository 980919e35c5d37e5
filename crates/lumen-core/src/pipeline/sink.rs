//! Result sinks: concurrent consumers that persist finished images.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::codec::ImageCodec;
use crate::error::{PipelineError, PipelineResult};
use crate::types::ImageResult;

/// Counters for one sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Sink index
    pub sink: usize,
    /// Results written
    pub saved: u64,
    /// Results dropped because the save failed
    pub failed: u64,
}

/// Drains the result channel and saves each result.
pub struct ResultSink {
    id: usize,
    codec: Arc<dyn ImageCodec>,
}

impl ResultSink {
    pub fn new(id: usize, codec: Arc<dyn ImageCodec>) -> Self {
        Self { id, codec }
    }

    /// Save results until the channel is closed and empty.
    ///
    /// A failed save is logged and the result dropped.
    pub fn run(&self, results: Receiver<ImageResult>) -> SinkStats {
        let mut stats = SinkStats {
            sink: self.id,
            ..SinkStats::default()
        };
        for result in results.iter() {
            match self.codec.save(result.image(), result.out_path()) {
                Ok(()) => {
                    stats.saved += 1;
                    tracing::debug!(sink = self.id, path = ?result.out_path(), "Saved result");
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!(sink = self.id, "Dropping result: {}", e);
                }
            }
        }
        stats
    }
}

/// The running sink threads of one pipelined run.
pub struct SinkPool {
    handles: Vec<(usize, JoinHandle<SinkStats>)>,
}

impl SinkPool {
    /// Spawn `count` sinks sharing `results`.
    pub fn spawn(
        count: usize,
        results: Receiver<ImageResult>,
        codec: Arc<dyn ImageCodec>,
    ) -> std::io::Result<Self> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let sink = ResultSink::new(id, Arc::clone(&codec));
            let results = results.clone();
            let handle = std::thread::Builder::new()
                .name(format!("lumen-sink-{id}"))
                .spawn(move || sink.run(results))?;
            handles.push((id, handle));
        }
        Ok(Self { handles })
    }

    /// Wait for every sink to finish draining.
    pub fn join(self) -> Vec<PipelineResult<SinkStats>> {
        self.handles
            .into_iter()
            .map(|(id, handle)| {
                handle
                    .join()
                    .map_err(|_| PipelineError::SinkPanicked { sink: id })
            })
            .collect()
    }
}
