//! Shared parking space for tasks that sit in a worker deque.
//!
//! Deques move [`TaskHandle`]s around; the tasks themselves stay here until the
//! worker that won a handle claims it. A handle is claimable once: the second
//! claim finds the slot empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::deque::TaskHandle;
use crate::types::ImageTask;

/// Tasks addressed by handle, shared by every worker of a run.
pub struct TaskArena<T = ImageTask> {
    next: AtomicU64,
    slots: Mutex<HashMap<u64, T>>,
}

impl<T> TaskArena<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Park `task` and return the handle that owns it.
    pub fn insert(&self, task: T) -> TaskHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, task);
        TaskHandle(id)
    }

    /// Take the task behind `handle`, leaving the slot empty.
    pub fn claim(&self, handle: TaskHandle) -> Option<T> {
        self.lock().remove(&handle.0)
    }

    /// Tasks currently parked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, T>> {
        // a panicking holder cannot leave the map half-updated
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for TaskArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
