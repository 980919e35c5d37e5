//! Work-stealing worker units.
//!
//! Every worker owns one [`ConcurrentDeque`] and runs a small state machine:
//!
//! ```text
//! Pulling ──task──▶ push own bottom ──▶ Pulling
//!    │ empty
//!    ▼
//! Processing ──own bottom──▶ process + emit ──▶ Pulling
//!    │ own deque empty
//!    ▼
//! Stealing ──victim top──▶ push own bottom ──▶ Pulling
//!    │ nothing stolen: yield, then a bounded wait on the task channel
//!
//! task channel closed ──▶ Draining (pop own bottom until empty) ──▶ Done
//! ```
//!
//! A task reaches a worker either through the shared task channel or through a
//! successful `pop_top` on a peer's deque. Both hand over exactly one owner, so
//! each task is processed once.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::arena::TaskArena;
use super::deque::{ConcurrentDeque, TaskHandle};
use super::executor::EffectExecutor;
use crate::codec::ImageCodec;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::types::{ImageResult, ImageTask};

/// Failed steals answered with a plain `yield_now` before waiting.
const SPIN_ROUNDS: u32 = 8;

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Checking the shared task channel without blocking
    Pulling,
    /// Working through the own deque
    Processing,
    /// Own deque empty, trying a random peer
    Stealing,
    /// Task channel closed, emptying the own deque
    Draining,
    /// Finished
    Done,
}

/// Per-worker counters returned when a worker finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Worker index
    pub worker: usize,
    /// Tasks whose result was emitted
    pub processed: u64,
    /// Tasks dropped because their image failed to load
    pub failed: u64,
    /// Successful steals
    pub steals: u64,
    /// Steal attempts, successful or not
    pub steal_attempts: u64,
}

/// How a worker finished: its counters, plus the error that stopped it early.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub stats: WorkerStats,
    /// Set when the worker aborted before the task channel closed
    pub error: Option<PipelineError>,
}

/// State shared by every worker of one run.
pub struct WorkerShared {
    /// One deque per worker, indexed by worker id
    pub deques: Vec<ConcurrentDeque>,
    /// Parking space for tasks referenced from the deques
    pub arena: TaskArena,
    /// Image loader for task inputs
    pub codec: Arc<dyn ImageCodec>,
    /// Effect chain runner
    pub executor: EffectExecutor,
    /// Longest idle wait after repeated failed steals
    pub max_backoff: Duration,
}

impl WorkerShared {
    /// `workers` deques of `deque_capacity` slots each; each pass uses `workers` chunks.
    pub fn new(
        workers: usize,
        deque_capacity: usize,
        codec: Arc<dyn ImageCodec>,
        max_backoff: Duration,
    ) -> Self {
        Self {
            deques: (0..workers)
                .map(|_| ConcurrentDeque::with_capacity(deque_capacity))
                .collect(),
            arena: TaskArena::new(),
            codec,
            executor: EffectExecutor::new(workers),
            max_backoff,
        }
    }
}

/// One worker unit.
pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
    tasks: Receiver<ImageTask>,
    results: Sender<ImageResult>,
    rng: StdRng,
    idle_rounds: u32,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(
        id: usize,
        shared: Arc<WorkerShared>,
        tasks: Receiver<ImageTask>,
        results: Sender<ImageResult>,
    ) -> Self {
        Self {
            id,
            shared,
            tasks,
            results,
            rng: StdRng::from_entropy(),
            idle_rounds: 0,
            stats: WorkerStats {
                worker: id,
                ..WorkerStats::default()
            },
        }
    }

    /// Run until the task channel is closed and the own deque is empty.
    ///
    /// Stops early only if the own deque overflows. The counters gathered up
    /// to that point are returned alongside the error.
    pub fn run(mut self) -> WorkerOutcome {
        tracing::debug!(worker = self.id, "Worker started");
        let mut state = WorkerState::Pulling;
        while state != WorkerState::Done {
            state = match self.step(state) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(
                        worker = self.id,
                        processed = self.stats.processed,
                        left_in_deque = self.own().size(),
                        "Worker aborted: {}",
                        e
                    );
                    return WorkerOutcome {
                        stats: self.stats,
                        error: Some(e),
                    };
                }
            };
        }
        tracing::debug!(
            worker = self.id,
            processed = self.stats.processed,
            steals = self.stats.steals,
            "Worker finished"
        );
        WorkerOutcome {
            stats: self.stats,
            error: None,
        }
    }

    /// Advance the state machine by one transition.
    pub fn step(&mut self, state: WorkerState) -> PipelineResult<WorkerState> {
        match state {
            WorkerState::Pulling => match self.tasks.try_recv() {
                Ok(task) => {
                    self.park(task)?;
                    Ok(WorkerState::Pulling)
                }
                Err(TryRecvError::Empty) => Ok(WorkerState::Processing),
                Err(TryRecvError::Disconnected) => Ok(WorkerState::Draining),
            },
            WorkerState::Processing => match self.own().pop_bottom() {
                Some(handle) => {
                    self.idle_rounds = 0;
                    self.process(handle);
                    Ok(WorkerState::Pulling)
                }
                None => Ok(WorkerState::Stealing),
            },
            WorkerState::Stealing => self.steal(),
            WorkerState::Draining => match self.own().pop_bottom() {
                Some(handle) => {
                    self.process(handle);
                    Ok(WorkerState::Draining)
                }
                None => Ok(WorkerState::Done),
            },
            WorkerState::Done => Ok(WorkerState::Done),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    fn own(&self) -> &ConcurrentDeque {
        &self.shared.deques[self.id]
    }

    /// Move a fresh task into the arena and the own deque.
    ///
    /// A task the deque rejects stays in the arena and is reported as
    /// stranded when the pool is joined.
    fn park(&mut self, task: ImageTask) -> PipelineResult<()> {
        let handle = self.shared.arena.insert(task);
        self.own().push_bottom(handle)?;
        Ok(())
    }

    fn steal(&mut self) -> PipelineResult<WorkerState> {
        let victim = self.rng.gen_range(0..self.shared.deques.len());
        self.stats.steal_attempts += 1;

        // stealing from ourselves is harmless: the own deque is empty here
        if let Some(handle) = self.shared.deques[victim].pop_top() {
            self.own().push_bottom(handle)?;
            self.stats.steals += 1;
            self.idle_rounds = 0;
            tracing::trace!(worker = self.id, victim, "Stole task");
            return Ok(WorkerState::Pulling);
        }

        self.back_off()
    }

    /// Yield for the first few failed steals, then wait on the task channel
    /// for an exponentially growing, capped duration.
    fn back_off(&mut self) -> PipelineResult<WorkerState> {
        self.idle_rounds = self.idle_rounds.saturating_add(1);
        if self.idle_rounds <= SPIN_ROUNDS {
            std::thread::yield_now();
            return Ok(WorkerState::Pulling);
        }

        let wait = backoff_duration(self.idle_rounds - SPIN_ROUNDS, self.shared.max_backoff);
        match self.tasks.recv_timeout(wait) {
            Ok(task) => {
                self.idle_rounds = 0;
                self.park(task)?;
                Ok(WorkerState::Pulling)
            }
            Err(RecvTimeoutError::Timeout) => Ok(WorkerState::Pulling),
            Err(RecvTimeoutError::Disconnected) => Ok(WorkerState::Draining),
        }
    }

    /// Load, filter and emit one task. Load failures drop the task.
    fn process(&mut self, handle: TaskHandle) {
        let Some(mut task) = self.shared.arena.claim(handle) else {
            tracing::warn!(worker = self.id, ?handle, "Handle had no parked task");
            return;
        };

        let image = match self.shared.codec.load(&task.in_path) {
            Ok(image) => image,
            Err(e) => {
                self.stats.failed += 1;
                tracing::error!(worker = self.id, "Dropping task: {}", e);
                return;
            }
        };

        let start = std::time::Instant::now();
        task.processed = Some(self.shared.executor.apply_chain(image, &task.effects));
        tracing::debug!(
            worker = self.id,
            path = ?task.in_path,
            effects = %task.effect_codes(),
            elapsed = ?start.elapsed(),
            "Processed task"
        );

        match ImageResult::from_task(task) {
            Ok(result) => {
                self.stats.processed += 1;
                if self.results.send(result).is_err() {
                    tracing::warn!(worker = self.id, "Result channel closed, result discarded");
                }
            }
            Err(e) => tracing::error!(worker = self.id, "{}", e),
        }
    }
}

/// `2^attempt` microseconds, capped at `max`.
pub fn backoff_duration(attempt: u32, max: Duration) -> Duration {
    let micros = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_micros(micros).min(max)
}

/// What [`WorkerPool::join`] reports once every worker has exited.
#[derive(Debug)]
pub struct PoolReport {
    /// One entry per worker; `Err` only if the worker panicked
    pub workers: Vec<PipelineResult<WorkerOutcome>>,
    /// Accepted tasks no worker finished: left in the arena by aborted
    /// workers, or still queued on the task channel after every worker left
    pub stranded: u64,
}

/// The running worker threads of one pipelined run.
pub struct WorkerPool {
    handles: Vec<(usize, JoinHandle<WorkerOutcome>)>,
    shared: Arc<WorkerShared>,
    unclaimed: Receiver<ImageTask>,
}

impl WorkerPool {
    /// Spawn `config.scheduler.workers` named worker threads.
    ///
    /// `results` is moved in; once every worker has exited, the result
    /// channel is closed.
    pub fn spawn(
        config: &Config,
        tasks: Receiver<ImageTask>,
        results: Sender<ImageResult>,
        codec: Arc<dyn ImageCodec>,
    ) -> std::io::Result<Self> {
        let workers = config.scheduler.workers;
        let shared = Arc::new(WorkerShared::new(
            workers,
            config.pipeline.deque_capacity,
            codec,
            Duration::from_micros(config.pipeline.steal_backoff_max_us),
        ));

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let worker = Worker::new(id, Arc::clone(&shared), tasks.clone(), results.clone());
            let handle = std::thread::Builder::new()
                .name(format!("lumen-worker-{id}"))
                .spawn(move || worker.run())?;
            handles.push((id, handle));
        }
        Ok(Self {
            handles,
            shared,
            unclaimed: tasks,
        })
    }

    /// Wait for every worker, then count what they left behind.
    ///
    /// Blocks until the task channel is closed. If every worker aborted, the
    /// remaining tasks are drained here so the producer is never stuck on a
    /// full channel.
    pub fn join(self) -> PoolReport {
        let workers: Vec<_> = self
            .handles
            .into_iter()
            .map(|(id, handle)| {
                handle
                    .join()
                    .map_err(|_| PipelineError::WorkerPanicked { worker: id })
            })
            .collect();

        let queued = self.unclaimed.iter().count() as u64;
        let parked = self.shared.arena.len() as u64;
        if queued + parked > 0 {
            tracing::warn!(queued, parked, "Tasks left unprocessed");
        }
        PoolReport {
            workers,
            stranded: queued + parked,
        }
    }
}
